//! Error types for webhook verification

/// Why an inbound webhook was rejected or could not be read.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("webhook signing key is not configured")]
    NotConfigured,

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("signature timestamp outside replay window (skew {skew_ms} ms)")]
    StaleTimestamp { skew_ms: i64 },

    #[error("signature mismatch")]
    Mismatch,

    #[error("invalid webhook payload: {0}")]
    Payload(String),
}

impl Error {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Error::NotConfigured => "not_configured",
            Error::MalformedHeader(_) => "malformed_header",
            Error::StaleTimestamp { .. } => "stale_timestamp",
            Error::Mismatch => "mismatch",
            Error::Payload(_) => "invalid_payload",
        }
    }

    /// Whether this error means the signature check failed (HTTP 401).
    pub fn is_signature_invalid(&self) -> bool {
        !matches!(self, Error::Payload(_))
    }
}

/// Result alias for webhook operations.
pub type Result<T> = std::result::Result<T, Error>;
