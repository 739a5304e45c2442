//! mDNS discovery of skill registries

use crate::{DiscoveryError, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vap_core::RegistryHandle;

/// Browse `service_type` and return the first registry that resolves
pub async fn discover(service_type: &str, timeout: Duration) -> Result<RegistryHandle> {
    let mdns = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

    let receiver = mdns
        .browse(service_type)
        .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

    info!("Starting mDNS discovery for {}", service_type);

    let deadline = Instant::now() + timeout;
    let mut found = None;

    while found.is_none() {
        let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!("mDNS receive error: {:?}", e);
                break;
            }
            Err(_) => {
                debug!("mDNS discovery timeout");
                break;
            }
        };

        match event {
            ServiceEvent::ServiceResolved(info) => {
                debug!("mDNS resolved: {:?}", info);

                let path = info
                    .get_properties()
                    .get("path")
                    .and_then(|p| p.val())
                    .map(|val| String::from_utf8_lossy(val).to_string());

                match info.get_addresses().iter().next() {
                    Some(addr) => {
                        found = Some(handle_from_service(
                            &addr.to_string(),
                            info.get_port(),
                            path.as_deref(),
                        ));
                    }
                    None => debug!("{} resolved without an address", info.get_fullname()),
                }
            }
            ServiceEvent::SearchStarted(_) => debug!("mDNS search started"),
            ServiceEvent::SearchStopped(_) => {
                debug!("mDNS search stopped");
                break;
            }
            _ => {}
        }
    }

    if let Err(e) = mdns.shutdown() {
        debug!("mDNS daemon shutdown failed: {}", e);
    }

    match found {
        Some(handle) => {
            info!("Found registry at {}", handle);
            Ok(handle)
        }
        None => Err(DiscoveryError::NotFound(service_type.to_string())),
    }
}

/// Handle for a resolved service; the base path comes from the `path` TXT
/// record
pub fn handle_from_service(host: &str, port: u16, path: Option<&str>) -> RegistryHandle {
    RegistryHandle::new(host, path.unwrap_or(vap_core::DEFAULT_BASE_PATH)).with_port(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_service() {
        let handle = handle_from_service("192.168.1.20", 5683, Some("/"));
        assert_eq!(handle.path, "");
        assert_eq!(handle.resource("skillRegistry/connect"), "skillRegistry/connect");

        let handle = handle_from_service("192.168.1.20", 5690, None);
        assert_eq!(handle.path, "vap");
        assert_eq!(handle.port, 5690);
    }
}
