use serde::Serialize;
use thiserror::Error;

/// Discriminant the resolver branches on.
///
/// Retry and fallback decisions are pure functions of this value, never of
/// the concrete error or its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    RemoteUnavailable,
    RateLimitExceeded,
    ZipBomb,
    DataUnavailable,
    Config,
    Internal,
}

impl ErrorKind {
    /// Only unavailability of the remote service justifies answering from
    /// the bulk dataset. A confirmed absence or a malformed request does not.
    pub fn triggers_fallback(self) -> bool {
        matches!(self, ErrorKind::RemoteUnavailable | ErrorKind::RateLimitExceeded)
    }

    /// Conditions allowed to cross the core boundary.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::DataUnavailable
                | ErrorKind::ZipBomb
                | ErrorKind::Config
                | ErrorKind::Internal
        )
    }

    /// Whether retrying the whole operation later has a chance to succeed.
    pub fn is_retry_later(self) -> bool {
        matches!(
            self,
            ErrorKind::RemoteUnavailable
                | ErrorKind::RateLimitExceeded
                | ErrorKind::DataUnavailable
                | ErrorKind::Internal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::ZipBomb => "zip_bomb",
            ErrorKind::DataUnavailable => "data_unavailable",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Which check of the archive guard tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipBombStage {
    Declared,
    Extracted,
    Download,
}

impl std::fmt::Display for ZipBombStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ZipBombStage::Declared => "declared size",
            ZipBombStage::Extracted => "extracted bytes",
            ZipBombStage::Download => "downloaded bytes",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Archive rejected, {stage} {size} exceeds cap of {cap} bytes")]
    ZipBomb {
        stage: ZipBombStage,
        size: u64,
        cap: u64,
    },

    #[error("Bulk dataset unavailable: {0}")]
    DataUnavailable(String),

    #[error("Bulk dataset format error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::RemoteUnavailable(_) | RegistryError::MalformedResponse(_) => {
                ErrorKind::RemoteUnavailable
            }
            RegistryError::RateLimitExceeded(_) => ErrorKind::RateLimitExceeded,
            RegistryError::ZipBomb { .. } => ErrorKind::ZipBomb,
            RegistryError::DataUnavailable(_) | RegistryError::Dataset(_) => {
                ErrorKind::DataUnavailable
            }
            RegistryError::Config(_) => ErrorKind::Config,
            RegistryError::Io(_) | RegistryError::Task(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RegistryError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RegistryError::NotFound(msg.into())
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(e: std::io::Error) -> Self {
        RegistryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::MalformedResponse(e.to_string())
    }
}

impl From<toml::de::Error> for RegistryError {
    fn from(e: toml::de::Error) -> Self {
        RegistryError::Config(e.to_string())
    }
}

impl From<zip::result::ZipError> for RegistryError {
    fn from(e: zip::result::ZipError) -> Self {
        RegistryError::Dataset(format!("zip: {}", e))
    }
}

impl From<csv::Error> for RegistryError {
    fn from(e: csv::Error) -> Self {
        RegistryError::Dataset(format!("csv: {}", e))
    }
}

impl From<tokio::task::JoinError> for RegistryError {
    fn from(e: tokio::task::JoinError) -> Self {
        RegistryError::Task(e.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RegistryError::MalformedResponse(e.to_string())
        } else if e.is_builder() {
            RegistryError::Config(e.to_string())
        } else {
            RegistryError::RemoteUnavailable(e.to_string())
        }
    }
}
