//! Errors raised while decoding a fetched message.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `Content-Type` value without a usable `type/subtype`.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Malformed base64 body.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// `multipart/*` part without a `boundary` parameter.
    #[error("Multipart part has no boundary parameter")]
    MissingBoundary,
}
