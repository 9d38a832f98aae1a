//! Subscription filters.

use crate::event::Event;
use crate::keys::{GroupTopic, WriterId};
use serde::{Deserialize, Serialize};

/// Selects events from a relay.
///
/// Empty lists and `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Accepted kinds.
    pub kinds: Vec<u16>,
    /// Accepted authors.
    pub authors: Vec<WriterId>,
    /// Required group topic tag.
    pub group: Option<GroupTopic>,
    /// Required namespace topic tag.
    pub namespace: Option<String>,
    /// Earliest `created_at` accepted, inclusive.
    pub since: Option<u64>,
}

impl Filter {
    /// Creates a filter that matches every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an accepted kind.
    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Adds an accepted author.
    pub fn author(mut self, author: WriterId) -> Self {
        self.authors.push(author);
        self
    }

    /// Requires the group topic tag.
    pub fn group(mut self, group: GroupTopic) -> Self {
        self.group = Some(group);
        self
    }

    /// Requires the namespace topic tag.
    pub fn namespace(mut self, topic: impl Into<String>) -> Self {
        self.namespace = Some(topic.into());
        self
    }

    /// Only accepts events created at or after `since`.
    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Returns true if `event` passes this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.author) {
            return false;
        }
        if let Some(group) = &self.group {
            if event.group_topic() != Some(group.to_string().as_str()) {
                return false;
            }
        }
        if let Some(namespace) = &self.namespace {
            if event.namespace_topic() != Some(namespace.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        true
    }
}
