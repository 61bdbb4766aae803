//! Error types for credential lifecycle operations

/// Errors from token exchange, refresh and credential storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("authorization server error: {0}")]
    AuthServer(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Short machine-readable label for metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotConfigured(_) => "not_configured",
            Error::Unauthorized(_) => "unauthorized",
            Error::AuthServer(_) => "auth_server_error",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
        }
    }
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
