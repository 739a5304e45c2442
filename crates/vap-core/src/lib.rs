//! VAP Core
//!
//! Core types, encoding, and protocol primitives for the skill side of the
//! voice-assistant registry protocol.
//!
//! This crate provides:
//! - Skill data model ([`SkillDescriptor`], [`LanguageTag`], [`NluData`], [`Capability`])
//! - Wire messages exchanged with the registry ([`messages`])
//! - MessagePack encoding in map or tuple shape ([`codec`])
//! - Request methods and response codes over `coap_lite` ([`code`])
//! - CoRE link-format parsing ([`link_format`])

pub mod code;
pub mod codec;
pub mod error;
pub mod link_format;
pub mod messages;
pub mod types;

pub use code::{Method, ResponseCode};
pub use codec::{decode, encode, Encoding};
pub use error::{Error, Result};
pub use link_format::Link;
pub use types::*;

/// VAP version implemented by this crate
pub const VAP_VERSION: &str = "Alpha";

/// Default CoAP port
pub const DEFAULT_PORT: u16 = 5683;

/// "All CoAP Nodes" IPv4 multicast group used for discovery
pub const DISCOVERY_MULTICAST_ADDR: &str = "224.0.1.187";

/// Well-known resource listing path
pub const WELL_KNOWN_CORE: &str = ".well-known/core";

/// Resource type advertised by a skill registry
pub const REGISTRY_RESOURCE_TYPE: &str = "vap-skill-registry";

/// Base path used when a registry does not advertise one
pub const DEFAULT_BASE_PATH: &str = "vap";

/// mDNS service type announced by skill registries
pub const MDNS_SERVICE_TYPE: &str = "_vap-skill-register._udp.local.";
