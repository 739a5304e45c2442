//! Session builder pattern

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vap_core::{NluDataset, RegistryHandle, SkillDescriptor};
use vap_discovery::{Discovery, DiscoveryConfig, DiscoverySource};
use vap_transport::{Transport, UdpConfig, UdpTransport};

use crate::client::RegistryClient;
use crate::config::SkillConfig;
use crate::error::Result;
use crate::handler::{ResubscribePolicy, SkillHandler};
use crate::nlu::NluSource;
use crate::session::Session;

/// Builder for a skill [`Session`]
pub struct SkillBuilder {
    descriptor: SkillDescriptor,
    discovery: DiscoveryConfig,
    transport: Option<Arc<dyn Transport>>,
    udp: UdpConfig,
    nlu: NluSource,
    resubscribe: ResubscribePolicy,
}

impl SkillBuilder {
    /// Create a new builder
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            descriptor: SkillDescriptor::new(id, name),
            discovery: DiscoveryConfig::default(),
            transport: None,
            udp: UdpConfig::default(),
            nlu: NluSource::default(),
            resubscribe: ResubscribePolicy::default(),
        }
    }

    /// Builder preloaded from a config file
    pub fn from_config(config: &SkillConfig) -> Self {
        let mut builder = Self::new(&config.skill.id, &config.skill.name)
            .discovery(config.discovery_config())
            .udp_config(config.udp_config())
            .resubscribe(config.resubscribe_policy());
        if let Some(token) = &config.skill.auth_token {
            builder = builder.auth_token(token);
        }
        if let Some(dir) = &config.nlu.dir {
            builder = builder.nlu_dir(dir.clone());
        }
        builder
    }

    /// Set the opaque authentication token sent on registration
    pub fn auth_token(mut self, token: &str) -> Self {
        self.descriptor = self.descriptor.with_auth_token(token);
        self
    }

    /// Use a known registry instead of discovering one
    pub fn registry(mut self, handle: RegistryHandle) -> Self {
        self.discovery.source = DiscoverySource::Static(handle);
        self
    }

    /// Set how the registry is discovered
    pub fn discovery(mut self, config: DiscoveryConfig) -> Self {
        self.discovery = config;
        self
    }

    /// Use an existing transport; no UDP socket is bound
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the UDP transport configuration
    pub fn udp_config(mut self, config: UdpConfig) -> Self {
        self.udp = config;
        self
    }

    /// Upload a dataset built in code
    pub fn nlu_dataset(mut self, dataset: NluDataset) -> Self {
        self.nlu = NluSource::Dataset(dataset);
        self
    }

    /// Load per-language NLU files from a directory
    pub fn nlu_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.nlu = NluSource::Directory(dir.into());
        self
    }

    /// Set how a lost subscription is recovered
    pub fn resubscribe(mut self, policy: ResubscribePolicy) -> Self {
        self.resubscribe = policy;
        self
    }

    /// Resolve the registry and build an unregistered session
    pub async fn build(self) -> Result<Session> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(UdpTransport::bind_with_config(self.udp).await?),
        };

        let handle = Discovery::with_config(self.discovery)
            .discover(transport.as_ref())
            .await?;
        info!("Skill {} uses registry {}", self.descriptor.id, handle);

        Ok(Session::new(
            RegistryClient::new(transport, handle),
            self.descriptor,
            self.nlu,
            self.resubscribe,
        ))
    }

    /// Build, register, sync intents and start answering with `handler`
    pub async fn start<H: SkillHandler>(self, handler: H) -> Result<Session> {
        let session = self.build().await?;
        session.start(handler).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_from_config() {
        let config = SkillConfig::parse(
            r#"
[skill]
id = "com.example.test"
name = "Test"
auth_token = "t0k"

[discovery]
method = "static"

[registry]
host = "10.0.0.5"
port = 5684

[nlu]
dir = "/srv/nlu"
"#,
        )
        .unwrap();

        let builder = SkillBuilder::from_config(&config);
        assert_eq!(builder.descriptor.id, "com.example.test");
        assert_eq!(builder.descriptor.auth_token.as_deref(), Some("t0k"));
        assert_eq!(
            builder.discovery.source,
            DiscoverySource::Static(RegistryHandle::new("10.0.0.5", "vap").with_port(5684))
        );
        assert_eq!(builder.nlu, NluSource::Directory(PathBuf::from("/srv/nlu")));
    }

    #[test]
    fn test_registry_overrides_discovery() {
        let handle = RegistryHandle::new("192.168.1.2", "vap");
        let builder = SkillBuilder::new("a", "b").registry(handle.clone());
        assert_eq!(builder.discovery.source, DiscoverySource::Static(handle));
    }
}
