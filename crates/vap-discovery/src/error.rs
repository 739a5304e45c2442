//! Discovery error types

use thiserror::Error;
use vap_transport::TransportError;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no resource of type {0:?} found")]
    NotFound(String),

    #[error("malformed discovery response: {0}")]
    MalformedResponse(String),

    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("discovery source not supported: {0}")]
    Unsupported(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
