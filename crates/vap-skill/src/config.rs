//! Skill configuration file
//!
//! ```toml
//! [skill]
//! id = "com.example.hello"
//! name = "Hello skill"
//!
//! [discovery]
//! method = "static"
//!
//! [registry]
//! host = "192.168.1.20"
//! path = "vap"
//!
//! [nlu]
//! dir = "assets/nlu"
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vap_core::RegistryHandle;
use vap_discovery::{DiscoveryConfig, DiscoverySource};
use vap_transport::UdpConfig;

use crate::error::{Result, SkillError};
use crate::handler::ResubscribePolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillConfig {
    pub skill: SkillSection,
    #[serde(default)]
    pub registry: Option<RegistrySection>,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub nlu: NluSection,
    #[serde(default)]
    pub observe: ObserveSection,
    /// Canned answers by intent name, used by the demo skill
    #[serde(default)]
    pub responses: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillSection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    #[default]
    Multicast,
    Mdns,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySection {
    pub method: DiscoveryMethod,
    pub timeout_ms: u64,
    pub multicast_addr: String,
    pub port: u16,
    pub resource_type: String,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            method: DiscoveryMethod::Multicast,
            timeout_ms: defaults.timeout.as_millis() as u64,
            multicast_addr: defaults.multicast_addr,
            port: defaults.port,
            resource_type: defaults.resource_type,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    pub bind: String,
    pub request_timeout_ms: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        let defaults = UdpConfig::default();
        Self {
            bind: defaults.bind_addr,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NluSection {
    /// Directory of per-language TOML files, relative to the config file
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObserveSection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ObserveSection {
    fn default() -> Self {
        let defaults = ResubscribePolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
        }
    }
}

fn default_port() -> u16 {
    vap_core::DEFAULT_PORT
}

fn default_base_path() -> String {
    vap_core::DEFAULT_BASE_PATH.to_string()
}

impl SkillConfig {
    /// Read and validate a config file. A relative NLU directory is
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SkillError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::parse(&text).map_err(|e| match e {
            SkillError::Config(message) => {
                SkillError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;

        if let (Some(dir), Some(base)) = (&config.nlu.dir, path.parent()) {
            if dir.is_relative() {
                config.nlu.dir = Some(base.join(dir));
            }
        }
        Ok(config)
    }

    /// Parse and validate config text
    pub fn parse(text: &str) -> Result<Self> {
        let config: SkillConfig =
            toml::from_str(text).map_err(|e| SkillError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.skill.id.trim().is_empty() {
            return Err(SkillError::Config("skill.id must not be empty".to_string()));
        }
        if self.discovery.method == DiscoveryMethod::Static && self.registry.is_none() {
            return Err(SkillError::Config(
                "discovery.method = \"static\" needs a [registry] section".to_string(),
            ));
        }
        if self.observe.initial_backoff_ms > self.observe.max_backoff_ms {
            return Err(SkillError::Config(
                "observe.initial_backoff_ms exceeds observe.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_handle(&self) -> Option<RegistryHandle> {
        self.registry
            .as_ref()
            .map(|r| RegistryHandle::new(&r.host, &r.path).with_port(r.port))
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let source = match (self.discovery.method, self.registry_handle()) {
            (DiscoveryMethod::Static, Some(handle)) => DiscoverySource::Static(handle),
            (DiscoveryMethod::Mdns, _) => DiscoverySource::Mdns,
            _ => DiscoverySource::Multicast,
        };
        DiscoveryConfig {
            source,
            timeout: Duration::from_millis(self.discovery.timeout_ms),
            multicast_addr: self.discovery.multicast_addr.clone(),
            port: self.discovery.port,
            resource_type: self.discovery.resource_type.clone(),
            ..Default::default()
        }
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            bind_addr: self.transport.bind.clone(),
            request_timeout: Duration::from_millis(self.transport.request_timeout_ms),
            ..Default::default()
        }
    }

    pub fn resubscribe_policy(&self) -> ResubscribePolicy {
        ResubscribePolicy {
            max_attempts: self.observe.max_attempts,
            initial_backoff: Duration::from_millis(self.observe.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.observe.max_backoff_ms),
        }
    }
}
