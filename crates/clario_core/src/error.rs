use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("io_error - {0}")]
    Io(String),
    #[error("storage_error - {0}")]
    Storage(String),
    #[error("upstream_error - {0}")]
    Upstream(String),
    #[error("timeout - {0}")]
    Timeout(String),
    /// The mentor produced a reply but the exchange was not written to history.
    #[error("history_out_of_sync - {message}")]
    HistoryOutOfSync { reply: String, message: String },
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn storage<M: Into<String>>(message: M) -> Self {
        Self::Storage(message.into())
    }

    pub fn upstream<M: Into<String>>(message: M) -> Self {
        Self::Upstream(message.into())
    }

    pub fn timeout<M: Into<String>>(message: M) -> Self {
        Self::Timeout(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io_error",
            Self::Storage(_) => "storage_error",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout(_) => "timeout",
            Self::HistoryOutOfSync { .. } => "history_out_of_sync",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput(message) => message,
            Self::InvalidData(message) => message,
            Self::NotFound(message) => message,
            Self::Io(message) => message,
            Self::Storage(message) => message,
            Self::Upstream(message) => message,
            Self::Timeout(message) => message,
            Self::HistoryOutOfSync { message, .. } => message,
        }
    }

    /// Client-side failures (bad request, unknown record) versus server-side ones.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
