//! Skill error types

use std::path::PathBuf;
use thiserror::Error;
use vap_core::ResponseCode;

pub type Result<T> = std::result::Result<T, SkillError>;

#[derive(Error, Debug)]
pub enum SkillError {
    #[error("registration rejected: {0}")]
    Registration(ResponseCode),

    #[error("intent sync rejected: {0}")]
    IntentSync(ResponseCode),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("teardown rejected: {0}")]
    Teardown(ResponseCode),

    #[error("subscription ended: {0}")]
    Subscription(ResponseCode),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("discovery error: {0}")]
    Discovery(#[from] vap_discovery::DiscoveryError),

    #[error("transport error: {0}")]
    Transport(#[from] vap_transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] vap_core::Error),

    #[error("NLU data error in {path}: {message}")]
    Nlu { path: PathBuf, message: String },

    #[error("config error: {0}")]
    Config(String),
}

/// Failures of a query that reached the registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("unexpected response code {0}")]
    UnexpectedCode(ResponseCode),

    #[error("client {0:?} not in query response")]
    ClientNotFound(String),

    #[error("capability {capability:?} not found for client {client_id:?}")]
    CapabilityNotFound { client_id: String, capability: String },
}
