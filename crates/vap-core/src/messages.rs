//! Wire messages exchanged between a skill and the registry
//!
//! Request bodies sent by the skill are maps with camelCase keys. The
//! registry answers connect requests and pushes observed requests as
//! positional tuples; decoding also accepts the map form of those.

use serde::{Deserialize, Serialize};

use crate::types::{Capability, ClientCapabilitySet, LanguageTag, NluDataset, SkillDescriptor};

/// Registry resource paths, relative to the registry base path
pub mod paths {
    pub const CONNECT: &str = "skillRegistry/connect";
    pub const REGISTER_INTENTS: &str = "skillRegistry/registerIntents";
    pub const NOTIFICATION: &str = "skillRegistry/notification";
    pub const QUERY: &str = "skillRegistry/query";
    pub const SKILLS: &str = "skillRegistry/skills";

    /// Observe/teardown resource of one skill
    pub fn skill(skill_id: &str) -> String {
        format!("{}/{}", SKILLS, skill_id)
    }
}

/// Connect request body; the skill descriptor is sent as-is
pub type MsgConnect = SkillDescriptor;

/// Connect answer: `(langs, uniqueAuthenticationToken, connectionAuthenticationToken)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgConnectResponse {
    /// Languages currently in use by the voice assistant
    pub langs: Vec<LanguageTag>,
    #[serde(default)]
    pub unique_authentication_token: Option<String>,
    #[serde(default)]
    pub connection_authentication_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgRegisterIntents {
    pub skill_id: String,
    pub nlu_data: NluDataset,
}

/// One entry of a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NotificationData {
    /// Data pushed to a client on the skill's own initiative
    #[serde(rename_all = "camelCase")]
    StandAlone {
        client_id: String,
        capabilities: Vec<Capability>,
    },
    /// Answer to a pushed `canYouAnswer` request
    #[serde(rename_all = "camelCase")]
    CanYouAnswer { request_id: u64, confidence: f32 },
    /// Answer to a pushed `request`
    #[serde(rename_all = "camelCase")]
    Requested {
        request_id: u64,
        capabilities: Vec<Capability>,
    },
}

impl From<ClientCapabilitySet> for NotificationData {
    fn from(set: ClientCapabilitySet) -> Self {
        NotificationData::StandAlone {
            client_id: set.client_id,
            capabilities: set.capabilities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgNotification {
    pub skill_id: String,
    pub data: Vec<NotificationData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgQuery {
    pub skill_id: String,
    pub data: Vec<ClientCapabilitySet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgQueryResponse {
    pub data: Vec<ClientCapabilitySet>,
}

/// Kinds of requests the registry pushes to a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    CanYouAnswer,
    Request,
}

impl RequestType {
    pub const CAN_YOU_ANSWER: &'static str = "canYouAnswer";
    pub const REQUEST: &'static str = "request";

    /// Exact match on the wire discriminator
    pub fn from_discriminator(s: &str) -> Option<Self> {
        match s {
            Self::CAN_YOU_ANSWER => Some(RequestType::CanYouAnswer),
            Self::REQUEST => Some(RequestType::Request),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::CanYouAnswer => Self::CAN_YOU_ANSWER,
            RequestType::Request => Self::REQUEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    pub client_id: String,
    #[serde(default)]
    pub system_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSlot {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestData {
    /// Matched intent, absent for requests that only carry capabilities
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub slots: Vec<RequestSlot>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// Request pushed on the skill's observe resource:
/// `(requestId, requestType, client, request)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgSkillRequest {
    pub request_id: u64,
    pub request_type: String,
    pub client: ClientData,
    pub request: RequestData,
}

/// Position of the request-type discriminator in [`MsgSkillRequest`]
pub const REQUEST_TYPE_POSITION: usize = 1;
