//! Errors from decoding individual MIME parts.
//!
//! Whole-message parsing never fails; these surface only from the part-level
//! helpers and are turned into warnings by [`crate::parse_metadata`].

/// Result alias for part-level decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// A part that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `Content-Type` value without a usable `type/subtype`.
    #[error("malformed content type {0:?}")]
    MalformedContentType(String),

    /// Base64 transfer encoding that does not decode.
    #[error("bad base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}
