//! Decoding errors.

/// Result alias for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to decode a transfer-encoded value.
///
/// Header parsing itself never fails; only explicit decoding does.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed encoded word or quoted-printable escape.
    #[error("Malformed encoding: {0}")]
    InvalidEncoding(String),

    /// Payload is not valid Base64.
    #[error("Bad base64 payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Decoded bytes are not valid UTF-8 for a UTF-8 charset.
    #[error("Decoded text is not UTF-8: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
}
