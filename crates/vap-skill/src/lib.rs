//! VAP Skill Library
//!
//! Registers a skill with a VAP registry and answers the requests it routes.
//!
//! # Example
//!
//! ```ignore
//! use vap_skill::prelude::*;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl SkillHandler for Hello {
//!     async fn can_you_answer(&self, request: &InboundRequest) -> f32 {
//!         if request.intent.as_deref() == Some("hello") { 1.0 } else { 0.0 }
//!     }
//!
//!     async fn request(&self, _request: &InboundRequest) -> Vec<Capability> {
//!         vec![Capability::text("Hello!")]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = SkillBuilder::new("com.example.hello", "Hello")
//!         .nlu_dir("assets/nlu")
//!         .start(Hello)
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod nlu;
pub mod observer;
pub mod session;

pub use builder::SkillBuilder;
pub use client::{match_capabilities, RegistryClient};
pub use config::SkillConfig;
pub use error::{QueryError, Result, SkillError};
pub use handler::{DispatchEvent, ResubscribePolicy, SkillHandler};
pub use nlu::NluSource;
pub use observer::{InboundRequest, RequestStream};
pub use session::{Session, SessionState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::SkillBuilder;
    pub use crate::error::{QueryError, Result, SkillError};
    pub use crate::handler::{DispatchEvent, SkillHandler};
    pub use crate::observer::InboundRequest;
    pub use crate::session::{Session, SessionState};
    pub use vap_core::{Capability, ClientCapabilitySet, LanguageTag, RegistryHandle};
}
