use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage quota exceeded: {0}")]
    Quota(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScribeError {
    /// Short error code string used in external response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ScribeError::Config(_) => "CONFIG_ERROR",
            ScribeError::Protocol(_) => "PROTOCOL_ERROR",
            ScribeError::Parse(_) => "PARSE_ERROR",
            ScribeError::Transport(_) => "UNAVAILABLE",
            ScribeError::Storage(_) => "STORAGE_ERROR",
            ScribeError::Quota(_) => "QUOTA_EXCEEDED",
            ScribeError::Validation(_) => "INVALID_REQUEST",
            ScribeError::NotFound { .. } => "NOT_FOUND",
            ScribeError::Serialization(_) => "SERIALIZATION_ERROR",
            ScribeError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
