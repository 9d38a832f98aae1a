//! Topics and replace coordinates.

use crate::event::{Tag, SNAPSHOT_KIND};
use crate::filter::Filter;
use crate::keys::{GroupTopic, WriterId};
use sha2::{Digest, Sha256};
use std::fmt;

const NAMESPACE_DOMAIN: &[u8] = b"snapsync/namespace/v1";

/// Identifies the single live event a writer keeps per namespace.
///
/// A relay that already holds an event with the same coordinate replaces it
/// only with an event carrying a strictly greater `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplaceCoordinate {
    /// Event kind.
    pub kind: u16,
    /// Writer that published the event.
    pub author: WriterId,
    /// Namespace-scoped identifier (the namespace topic).
    pub identifier: String,
}

impl fmt::Display for ReplaceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.author, self.identifier)
    }
}

/// Address derivation for one namespace within one replica group.
///
/// All methods are pure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    namespace: String,
    group: GroupTopic,
    namespace_topic: String,
}

impl Addressing {
    /// Derives the addresses for `namespace` under `group`.
    pub fn new(namespace: impl Into<String>, group: GroupTopic) -> Self {
        let namespace = namespace.into();
        let namespace_topic = namespace_topic(&group, &namespace);
        Self {
            namespace,
            group,
            namespace_topic,
        }
    }

    /// Returns the plain namespace string.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the hashed namespace topic carried in event tags.
    ///
    /// The hash keeps the namespace name itself off the relay and scopes it
    /// to the group, so two groups using the same name never collide.
    pub fn namespace_topic(&self) -> &str {
        &self.namespace_topic
    }

    /// Returns the replica-group topic.
    pub fn group_topic(&self) -> GroupTopic {
        self.group
    }

    /// Returns the replace coordinate of `writer`'s snapshot event.
    pub fn coordinate(&self, writer: WriterId) -> ReplaceCoordinate {
        ReplaceCoordinate {
            kind: SNAPSHOT_KIND,
            author: writer,
            identifier: self.namespace_topic.clone(),
        }
    }

    /// Returns the tags of a snapshot event for this namespace.
    pub fn tags(&self) -> Vec<Tag> {
        vec![
            Tag::Namespace(self.namespace_topic.clone()),
            Tag::Replace(self.namespace_topic.clone()),
            Tag::Group(self.group.to_string()),
        ]
    }

    /// Returns the subscription filter for this namespace.
    ///
    /// A zero cursor omits `since` so the relay replays its full backlog.
    pub fn filter(&self, cursor: u64) -> Filter {
        let filter = Filter::new()
            .kind(SNAPSHOT_KIND)
            .group(self.group)
            .namespace(self.namespace_topic.clone());
        if cursor == 0 {
            filter
        } else {
            filter.since(cursor)
        }
    }

    /// Returns true if `tags` carry this namespace's topic.
    pub fn matches_namespace(&self, tags: &[Tag]) -> bool {
        tags.iter()
            .any(|t| matches!(t, Tag::Namespace(topic) if *topic == self.namespace_topic))
    }
}

fn namespace_topic(group: &GroupTopic, namespace: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(NAMESPACE_DOMAIN);
    hasher.update(group.as_bytes());
    hasher.update(namespace.as_bytes());
    hex::encode(hasher.finalize())
}
