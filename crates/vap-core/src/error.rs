//! Error types for VAP

use thiserror::Error;

/// Result type alias for VAP core operations
pub type Result<T> = std::result::Result<T, Error>;

/// VAP core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer too small
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// MessagePack encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// MessagePack decoding error
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Link-format body could not be parsed
    #[error("invalid link format: {0}")]
    InvalidLinkFormat(String),

    /// Language tag could not be parsed
    #[error("invalid language tag: {0:?}")]
    InvalidLanguageTag(String),

    /// Generic protocol error
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::EncodeError(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::DecodeError(e.to_string())
    }
}
