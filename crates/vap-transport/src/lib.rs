//! VAP Transport Layer
//!
//! This crate provides the transport used to talk to a skill registry:
//! - The [`Transport`] contract: request/response, observe subscriptions
//!   and multicast discovery
//! - CoAP over UDP ([`UdpTransport`])

pub mod error;
pub mod traits;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{Observation, Request, Response, Transport};

#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpTransport};
