//! Error types for KFX decoding and encoding.
//!
//! Only fatal conditions live here. Recoverable problems found while decoding
//! (schema violations, unresolved symbols, unsupported features) are
//! collected in [`Diagnostics`](crate::Diagnostics) instead.

use thiserror::Error;

/// Errors that abort a decode or encode call.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad signature, truncated buffer, unterminated varint, out-of-range offsets.
    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    /// The caller asked the encoder to write something it cannot represent.
    #[error("Encoding precondition failed: {0}")]
    EncodingPrecondition(String),

    /// A value failed construction-time validation.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The stream is wrapped in DRMION and must be decrypted first.
    #[error("Content is DRM-protected")]
    DrmProtected,

    /// Input exceeded the configured size limit.
    #[error("Container is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Strict mode: symbol-resolution errors were reported during decode.
    #[error("{count} unresolved symbol reference(s): {summary}")]
    UnresolvedSymbols { count: usize, summary: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedStream(msg.into())
    }

    pub(crate) fn precondition<S: Into<String>>(msg: S) -> Self {
        Self::EncodingPrecondition(msg.into())
    }

    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidValue(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
