//! Configuration for a sync store.

use crate::clock::{Clock, SystemClock};
use crate::error::{SyncError, SyncResult};
use snapsync_protocol::{GroupKey, Relay, WriterIdentity};
use snapsync_storage::{FileBackend, InMemoryBackend, KvBackend};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default quiet period between the last write and a publish.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1010);

/// Options for [`crate::SyncStore::open`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Namespace partitioning this store's key space. Must not be empty.
    pub namespace: String,
    /// Signing identity of this writer.
    pub writer: WriterIdentity,
    /// Replica-group key shared with peers.
    pub group_key: GroupKey,
    /// Relays to publish to and subscribe on. Empty means local only.
    pub relays: Vec<Arc<dyn Relay>>,
    /// Quiet period after the last write before publishing.
    pub debounce: Duration,
    /// Name of the local database file, without extension.
    pub db_name: Option<String>,
    /// Retry behavior for failed publishes.
    pub retry: RetryConfig,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Local storage backend.
    pub backend: Arc<dyn KvBackend>,
}

impl StoreOptions {
    /// Creates options for `namespace` with a fresh writer identity, a fresh
    /// group key and an in-memory backend.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            writer: WriterIdentity::generate(),
            group_key: GroupKey::generate(),
            relays: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            db_name: None,
            retry: RetryConfig::default(),
            clock: Arc::new(SystemClock),
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// Sets the writer identity.
    pub fn with_writer(mut self, writer: WriterIdentity) -> Self {
        self.writer = writer;
        self
    }

    /// Sets the replica-group key.
    pub fn with_group_key(mut self, group_key: GroupKey) -> Self {
        self.group_key = group_key;
        self
    }

    /// Adds a relay.
    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relays.push(relay);
        self
    }

    /// Replaces the relay list.
    pub fn with_relays(mut self, relays: Vec<Arc<dyn Relay>>) -> Self {
        self.relays = relays;
        self
    }

    /// Sets the debounce period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the database file name.
    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the storage backend.
    pub fn with_backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Returns the database file name: `db_name` if set, otherwise derived
    /// from the namespace.
    pub fn database_name(&self) -> String {
        match &self.db_name {
            Some(name) => name.clone(),
            None => {
                let safe: String = self
                    .namespace
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                    .collect();
                format!("snapsync-{safe}")
            }
        }
    }

    /// Opens `<dir>/<database_name>.log` as the storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is locked by another
    /// store.
    pub fn open_file_backend(mut self, dir: &Path) -> SyncResult<Self> {
        let path = dir.join(format!("{}.log", self.database_name()));
        self.backend = Arc::new(FileBackend::open_with_create_dirs(&path)?);
        Ok(self)
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the namespace is empty or the
    /// retry delays are inconsistent.
    pub fn validate(&self) -> SyncResult<()> {
        if self.namespace.is_empty() {
            return Err(SyncError::Configuration("namespace must not be empty".into()));
        }
        if self.retry.base_delay > self.retry.max_retry_delay {
            return Err(SyncError::Configuration(format!(
                "retry base delay {:?} exceeds max delay {:?}",
                self.retry.base_delay, self.retry.max_retry_delay
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("namespace", &self.namespace)
            .field("writer", &self.writer.id())
            .field("relays", &self.relays.iter().map(|r| r.url()).collect::<Vec<_>>())
            .field("debounce", &self.debounce)
            .field("db_name", &self.db_name)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Retry behavior for failed publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per cycle before giving up. Zero retries forever.
    pub max_retry_count: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the delay.
    pub max_retry_delay: Duration,
}

impl RetryConfig {
    /// Creates a configuration giving up after `max_retry_count` attempts.
    pub fn new(max_retry_count: u32) -> Self {
        Self {
            max_retry_count,
            ..Self::default()
        }
    }

    /// Sets the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Returns true if another attempt is allowed after `retry_count`
    /// consecutive failures.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        self.max_retry_count == 0 || retry_count < self.max_retry_count
    }

    /// Delay after `retry_count` consecutive failures (1-indexed):
    /// `base * 2^(retry_count - 1)`, capped at the maximum.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_retry_delay, |d| d.min(self.max_retry_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 0,
            base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}
