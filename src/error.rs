//! Error types for typed error handling.
//!
//! [`CodecError`] and [`TransmitError`] are the narrow errors returned by the
//! codec and the transmitter. [`Error`] is the pipeline-wide taxonomy that the
//! delivery coordinator records and the server maps to HTTP status codes.

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from sealing or opening an encrypted blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Key or plaintext could not be sealed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Blob is malformed, tampered with, or sealed under another key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Plaintext is not a serialized reading.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Outcome of a single failed transmit attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmitError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// Server rejected the bearer token.
    #[error("server rejected credentials (401)")]
    Unauthorized,

    /// Server asked the device to back off.
    #[error("server rate limited the device (429)")]
    RateLimited,

    /// Any other non-201 response.
    #[error("server responded with status {status}")]
    Rejected { status: u16 },
}

impl TransmitError {
    /// Whether resending the same blob later can succeed without operator action.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited => true,
            Self::Unauthorized => false,
            Self::Rejected { status } => *status >= 500 || *status == 408,
        }
    }
}

/// Pipeline errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network or server failure; the blob is buffered and retried later.
    #[error("transient delivery failure: {0}")]
    TransientDelivery(String),

    /// Malformed key or input; the reading is dropped.
    #[error("content encryption failure: {0}")]
    ContentEncryption(String),

    /// Tampered or wrong-key blob at decrypt time.
    #[error("authentication failure: {0}")]
    Authentication(String),

    /// Missing or invalid credential, key, device id or setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Server-side per-device limit reached.
    #[error("rate limit exceeded for device '{device_id}'")]
    RateLimited { device_id: String },

    /// Request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Create a rate limit exceeded error.
    pub fn rate_limited(device_id: impl Into<String>) -> Self {
        Self::RateLimited {
            device_id: device_id.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Authentication(_) => 401,
            Self::RateLimited { .. } => 429,
            Self::TransientDelivery(_) => 503,
            Self::ContentEncryption(_)
            | Self::Configuration(_)
            | Self::Storage(_) => 500,
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encryption(reason) => Self::ContentEncryption(reason),
            CodecError::Authentication(reason) => Self::Authentication(reason),
            CodecError::Decode(reason) => Self::Authentication(format!("undecodable: {reason}")),
        }
    }
}

impl From<TransmitError> for Error {
    fn from(err: TransmitError) -> Self {
        match err {
            TransmitError::Unauthorized => {
                Self::Configuration("server rejected the API token".to_string())
            },
            other => Self::TransientDelivery(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transmit_error_retriability() {
        assert!(TransmitError::Network("refused".into()).is_retriable());
        assert!(TransmitError::RateLimited.is_retriable());
        assert!(TransmitError::Rejected { status: 503 }.is_retriable());
        assert!(!TransmitError::Rejected { status: 400 }.is_retriable());
        assert!(!TransmitError::Unauthorized.is_retriable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::invalid_request("x").status_code(), 400);
        assert_eq!(Error::rate_limited("dev").status_code(), 429);
        assert_eq!(Error::config("x").status_code(), 500);
        assert_eq!(Error::Storage("disk".into()).status_code(), 500);
    }

    #[test]
    fn test_codec_error_mapping() {
        let err: Error = CodecError::Encryption("bad key".into()).into();
        assert!(matches!(err, Error::ContentEncryption(_)));

        let err: Error = CodecError::Decode("eof".into()).into();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn test_unauthorized_maps_to_configuration() {
        let err: Error = TransmitError::Unauthorized.into();
        assert!(matches!(err, Error::Configuration(_)));

        let err: Error = TransmitError::Rejected { status: 502 }.into();
        assert!(matches!(err, Error::TransientDelivery(_)));
    }
}
