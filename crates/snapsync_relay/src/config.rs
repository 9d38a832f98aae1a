//! Relay configuration.

/// Configuration for an in-process relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// URL reported by connections, for logging.
    pub url: String,
    /// Whether to verify event ids and signatures before storing.
    pub verify_signatures: bool,
    /// Maximum content size accepted, in bytes.
    pub max_content_bytes: Option<usize>,
    /// Maximum number of stored events replayed to a new subscription.
    pub max_backlog: Option<usize>,
}

impl RelayConfig {
    /// Creates a configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verify_signatures: true,
            max_content_bytes: None,
            max_backlog: None,
        }
    }

    /// Disables signature verification.
    pub fn without_verification(mut self) -> Self {
        self.verify_signatures = false;
        self
    }

    /// Sets the maximum content size.
    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = Some(max);
        self
    }

    /// Sets the maximum backlog replayed per subscription.
    pub fn with_max_backlog(mut self, max: usize) -> Self {
        self.max_backlog = Some(max);
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new("mem://relay")
    }
}
