use async_trait::async_trait;
use std::time::Duration;

/// A single GET against the remote registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            timeout,
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }
}

/// Raw HTTP answer; status classification happens in the remote client.
#[derive(Debug, Clone)]
pub struct RemoteReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failure: no HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout(String),
    Connect(String),
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(m) => write!(f, "timeout: {}", m),
            TransportError::Connect(m) => write!(f, "connect: {}", m),
            TransportError::Other(m) => write!(f, "transport: {}", m),
        }
    }
}

/// Seam between the remote client and the wire.
///
/// The production implementation wraps a pooled `reqwest::Client`; tests
/// plug in scripted transports to drive retry and fallback paths.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn get(&self, request: &RemoteRequest) -> Result<RemoteReply, TransportError>;
}
