//! Relay-side event table.

use crate::error::{RelayError, RelayResult};
use snapsync_protocol::{Event, Filter, ReplaceCoordinate};
use std::collections::HashMap;

/// Outcome of inserting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    /// The event was new for its coordinate.
    Inserted,
    /// The event replaced an older one.
    Replaced,
}

/// Events held by a relay.
///
/// Replaceable events (those with a replace tag) are keyed by coordinate,
/// others are appended.
#[derive(Debug, Default)]
pub struct EventStore {
    replaceable: HashMap<ReplaceCoordinate, Event>,
    regular: Vec<Event>,
}

impl EventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event, applying replace semantics.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Stale`] if an event with the same coordinate and
    /// an equal or greater `created_at` is already stored.
    pub fn insert(&mut self, event: Event) -> RelayResult<Stored> {
        let Some(coordinate) = event.coordinate() else {
            self.regular.push(event);
            return Ok(Stored::Inserted);
        };

        match self.replaceable.get(&coordinate) {
            Some(existing) if existing.created_at >= event.created_at => Err(RelayError::Stale {
                stored: existing.created_at,
                incoming: event.created_at,
            }),
            Some(_) => {
                self.replaceable.insert(coordinate, event);
                Ok(Stored::Replaced)
            }
            None => {
                self.replaceable.insert(coordinate, event);
                Ok(Stored::Inserted)
            }
        }
    }

    /// Returns stored events matching `filter`, oldest first.
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        let mut out: Vec<Event> = self
            .replaceable
            .values()
            .chain(self.regular.iter())
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.created_at);
        out
    }

    /// Returns the stored event for a coordinate.
    pub fn get(&self, coordinate: &ReplaceCoordinate) -> Option<&Event> {
        self.replaceable.get(coordinate)
    }

    /// Returns the number of stored events.
    pub fn len(&self) -> usize {
        self.replaceable.len() + self.regular.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
