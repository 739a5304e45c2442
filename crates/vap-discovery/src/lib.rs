//! VAP Discovery
//!
//! Locates the skill registry a skill should talk to:
//! - CoAP multicast query of `.well-known/core` (the default)
//! - mDNS browse of `_vap-skill-register._udp` (feature `mdns`)
//! - A statically configured registry

pub mod error;

#[cfg(feature = "mdns")]
pub mod mdns;

pub use error::{DiscoveryError, Result};

use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};
use vap_core::{link_format, Method, RegistryHandle};
use vap_transport::{Request, Response, Transport};

/// Where the registry handle comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Multicast GET on `.well-known/core`
    Multicast,
    /// mDNS browse
    Mdns,
    /// Fixed registry, no network I/O
    Static(RegistryHandle),
}

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub source: DiscoverySource,
    /// How long to wait for answers
    pub timeout: Duration,
    /// Multicast group queried by [`DiscoverySource::Multicast`]
    pub multicast_addr: String,
    pub port: u16,
    /// Resource type a registry advertises
    pub resource_type: String,
    /// Service type browsed by [`DiscoverySource::Mdns`]
    pub service_type: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: DiscoverySource::Multicast,
            timeout: Duration::from_secs(2),
            multicast_addr: vap_core::DISCOVERY_MULTICAST_ADDR.to_string(),
            port: vap_core::DEFAULT_PORT,
            resource_type: vap_core::REGISTRY_RESOURCE_TYPE.to_string(),
            service_type: vap_core::MDNS_SERVICE_TYPE.to_string(),
        }
    }
}

/// Resolves a [`RegistryHandle`]
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new() -> Self {
        Self {
            config: DiscoveryConfig::default(),
        }
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Resolve the registry. A single attempt bounded by the configured
    /// timeout; the first matching answer wins and ends the wait.
    pub async fn discover<T: Transport + ?Sized>(&self, transport: &T) -> Result<RegistryHandle> {
        match &self.config.source {
            DiscoverySource::Static(handle) => {
                info!("Using configured registry {}", handle);
                Ok(handle.clone())
            }
            DiscoverySource::Multicast => self.discover_multicast(transport).await,
            DiscoverySource::Mdns => self.discover_mdns().await,
        }
    }

    async fn discover_multicast<T: Transport + ?Sized>(&self, transport: &T) -> Result<RegistryHandle> {
        let rt = &self.config.resource_type;
        let request = Request::new(
            Method::Get,
            &self.config.multicast_addr,
            self.config.port,
            vap_core::WELL_KNOWN_CORE,
        )
        .with_query(&format!("rt={}", rt))
        .non_confirmable();

        info!(
            "Discovering {} via {}:{}",
            rt, self.config.multicast_addr, self.config.port
        );
        let mut found = None;
        let mut last_error = None;
        let mut accept = |response: &Response| {
            if !response.code.is_success() {
                debug!("Ignoring {} from {}", response.code, response.peer);
                return false;
            }
            match handle_from_response(&response.payload, response.peer, rt) {
                Ok(handle) => {
                    found = Some(handle);
                    true
                }
                Err(e) => {
                    warn!("Ignoring discovery answer from {}: {}", response.peer, e);
                    last_error = Some(e);
                    false
                }
            }
        };
        transport
            .discover_first(request, self.config.timeout, &mut accept)
            .await?;

        match found {
            Some(handle) => {
                info!("Found registry at {}", handle);
                Ok(handle)
            }
            None => Err(last_error.unwrap_or_else(|| DiscoveryError::NotFound(rt.clone()))),
        }
    }

    #[cfg(feature = "mdns")]
    async fn discover_mdns(&self) -> Result<RegistryHandle> {
        mdns::discover(&self.config.service_type, self.config.timeout).await
    }

    #[cfg(not(feature = "mdns"))]
    async fn discover_mdns(&self) -> Result<RegistryHandle> {
        Err(DiscoveryError::Unsupported(
            "mDNS (built without the `mdns` feature)".to_string(),
        ))
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a handle from a `.well-known/core` answer.
///
/// The registry is the first link advertising `resource_type`. A relative
/// target lives on the answering peer; an absolute `coap://` target names
/// its own host and port.
pub fn handle_from_response(body: &[u8], peer: SocketAddr, resource_type: &str) -> Result<RegistryHandle> {
    let text = std::str::from_utf8(body)
        .map_err(|e| DiscoveryError::MalformedResponse(format!("body is not UTF-8: {}", e)))?;

    let links =
        link_format::parse(text).map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))?;

    let link = links
        .iter()
        .find(|l| l.has_resource_type(resource_type))
        .ok_or_else(|| DiscoveryError::NotFound(resource_type.to_string()))?;

    match link.target.split_once("://") {
        Some((_scheme, rest)) => absolute_target(rest, peer),
        None => Ok(RegistryHandle::new(&peer.ip().to_string(), &link.target).with_port(peer.port())),
    }
}

fn absolute_target(rest: &str, peer: SocketAddr) -> Result<RegistryHandle> {
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| DiscoveryError::MalformedResponse(format!("bad authority {:?}", authority)))?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(DiscoveryError::MalformedResponse(format!(
            "empty host in {:?}",
            rest
        )));
    }

    let port = match port {
        Some(p) => p
            .parse()
            .map_err(|_| DiscoveryError::MalformedResponse(format!("bad port {:?}", p)))?,
        None => peer.port(),
    };

    Ok(RegistryHandle::new(host, path).with_port(port))
}
