use std::time::Duration;

/// Configuration for a [`ServiceClient`](super::ServiceClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long async single-response calls wait for their result.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for waiting for a response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration for a [`LocalChannel`](super::LocalChannel).
#[derive(Debug, Clone, Default)]
pub struct LocalChannelConfig {
    /// Encode and decode every request and response with the method's
    /// marshaller, as a remote transport would.
    pub marshal: bool,
}

impl LocalChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marshal(mut self, marshal: bool) -> Self {
        self.marshal = marshal;
        self
    }
}
