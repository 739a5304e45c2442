//! Registry protocol operations
//!
//! [`RegistryClient`] performs each stage of the skill protocol against a
//! resolved registry. It holds no lifecycle state; ordering and teardown
//! are enforced by [`Session`](crate::Session).

use std::sync::Arc;
use tracing::{debug, info, warn};
use vap_core::codec::{self, Encoding};
use vap_core::messages::{
    paths, MsgConnectResponse, MsgNotification, MsgQuery, MsgQueryResponse, MsgRegisterIntents,
    NotificationData,
};
use vap_core::{
    Capability, ClientCapabilitySet, LanguageTag, Method, NluDataset, RegistryHandle, ResponseCode,
    SkillDescriptor,
};
use vap_transport::{Request, Transport};

use crate::error::{QueryError, Result, SkillError};
use crate::observer::RequestStream;

/// Stateless client for one registry
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn Transport>,
    handle: RegistryHandle,
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn Transport>, handle: RegistryHandle) -> Self {
        Self { transport, handle }
    }

    pub fn handle(&self) -> &RegistryHandle {
        &self.handle
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn request(&self, method: Method, resource: &str) -> Request {
        Request::to_registry(&self.handle, method, resource)
    }

    /// Connect the skill; returns the languages the assistant uses, in
    /// registry order
    pub async fn register(&self, descriptor: &SkillDescriptor) -> Result<Vec<LanguageTag>> {
        let payload = codec::encode(descriptor, Encoding::Named)?;
        let request = self.request(Method::Post, paths::CONNECT).with_payload(payload);

        info!("Registering skill {} with {}", descriptor.id, self.handle);
        let response = self.transport.request(request).await?;

        if response.code != ResponseCode::Created {
            warn!("Registry rejected skill {}: {}", descriptor.id, response.code);
            return Err(SkillError::Registration(response.code));
        }

        let connect: MsgConnectResponse = codec::decode(&response.payload)?;
        info!(
            "Skill {} registered, languages: {}",
            descriptor.id,
            connect
                .langs
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(connect.langs)
    }

    /// Upload the NLU dataset, replacing whatever the registry held
    pub async fn sync_intents(&self, skill_id: &str, dataset: &NluDataset) -> Result<()> {
        let msg = MsgRegisterIntents {
            skill_id: skill_id.to_string(),
            nlu_data: dataset.clone(),
        };
        let payload = codec::encode(&msg, Encoding::Named)?;
        let request = self
            .request(Method::Post, paths::REGISTER_INTENTS)
            .with_payload(payload);

        debug!(
            "Uploading intents for {} ({} languages)",
            skill_id,
            dataset.len()
        );
        let response = self.transport.request(request).await?;

        if response.code != ResponseCode::Created {
            warn!("Registry rejected intents of {}: {}", skill_id, response.code);
            return Err(SkillError::IntentSync(response.code));
        }

        info!("Intents of {} synced", skill_id);
        Ok(())
    }

    /// Subscribe to the requests the registry routes to this skill
    pub async fn observe(&self, skill_id: &str) -> Result<RequestStream> {
        let request = self.request(Method::Get, &paths::skill(skill_id));
        let observation = self.transport.observe(request).await?;
        Ok(RequestStream::new(skill_id, observation))
    }

    /// Send notification entries. The registry's answer is not inspected.
    pub async fn notify(&self, skill_id: &str, data: Vec<NotificationData>) -> Result<()> {
        let msg = MsgNotification {
            skill_id: skill_id.to_string(),
            data,
        };
        let payload = codec::encode(&msg, Encoding::Named)?;
        let request = self
            .request(Method::Post, paths::NOTIFICATION)
            .with_payload(payload);

        let response = self.transport.request(request).await?;
        debug!("Notification from {} answered {}", skill_id, response.code);
        Ok(())
    }

    /// Push capabilities to a client on the skill's own initiative
    pub async fn notify_client(&self, skill_id: &str, set: ClientCapabilitySet) -> Result<()> {
        self.notify(skill_id, vec![NotificationData::from(set)]).await
    }

    /// Ask the registry for capabilities of a client. The answer holds, in
    /// query order, the first capability matching each queried name.
    pub async fn query(&self, skill_id: &str, set: ClientCapabilitySet) -> Result<ClientCapabilitySet> {
        let msg = MsgQuery {
            skill_id: skill_id.to_string(),
            data: vec![set.clone()],
        };
        let payload = codec::encode(&msg, Encoding::Named)?;
        let request = self.request(Method::Get, paths::QUERY).with_payload(payload);

        let response = self.transport.request(request).await?;
        if response.code != ResponseCode::Content {
            return Err(QueryError::UnexpectedCode(response.code).into());
        }

        let answer: MsgQueryResponse = codec::decode(&response.payload)?;
        Ok(match_capabilities(&answer, &set)?)
    }

    /// Query a single capability of a client
    pub async fn query_capability(
        &self,
        skill_id: &str,
        client_id: &str,
        capability: Capability,
    ) -> Result<Capability> {
        let set = ClientCapabilitySet::new(client_id, vec![capability]);
        let mut answer = self.query(skill_id, set).await?;
        // A successful match holds exactly one capability per queried one
        answer
            .capabilities
            .pop()
            .ok_or_else(|| SkillError::InvalidState("empty query match".to_string()))
    }

    /// Tear the skill down on the registry
    pub async fn close(&self, skill_id: &str) -> Result<()> {
        let request = self.request(Method::Delete, &paths::skill(skill_id));

        info!("Closing skill {}", skill_id);
        let response = self.transport.request(request).await?;

        if response.code != ResponseCode::Deleted {
            warn!("Registry rejected teardown of {}: {}", skill_id, response.code);
            return Err(SkillError::Teardown(response.code));
        }
        Ok(())
    }
}

/// Pick the queried capabilities out of a query answer
pub fn match_capabilities(
    answer: &MsgQueryResponse,
    query: &ClientCapabilitySet,
) -> std::result::Result<ClientCapabilitySet, QueryError> {
    let entry = answer
        .data
        .iter()
        .find(|set| set.client_id == query.client_id)
        .ok_or_else(|| QueryError::ClientNotFound(query.client_id.clone()))?;

    let capabilities = query
        .capabilities
        .iter()
        .map(|wanted| {
            entry
                .find(&wanted.name)
                .cloned()
                .ok_or_else(|| QueryError::CapabilityNotFound {
                    client_id: query.client_id.clone(),
                    capability: wanted.name.clone(),
                })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ClientCapabilitySet {
        client_id: entry.client_id.clone(),
        capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vap_core::Value;

    fn answer() -> MsgQueryResponse {
        MsgQueryResponse {
            data: vec![
                ClientCapabilitySet::new(
                    "other",
                    vec![Capability::new("preferences").with("color", "red")],
                ),
                ClientCapabilitySet::new(
                    "123456789a",
                    vec![
                        Capability::new("preferences").with("color", "blue"),
                        Capability::new("volume").with("level", 3),
                        Capability::new("preferences").with("color", "green"),
                    ],
                ),
            ],
        }
    }

    #[test]
    fn test_match_first_capability_of_client() {
        let query = ClientCapabilitySet::new("123456789a", vec![Capability::new("preferences")]);
        let matched = match_capabilities(&answer(), &query).unwrap();

        assert_eq!(matched.client_id, "123456789a");
        assert_eq!(matched.capabilities.len(), 1);
        assert_eq!(matched.capabilities[0].get("color"), Some(&Value::from("blue")));
    }

    #[test]
    fn test_match_keeps_query_order() {
        let query = ClientCapabilitySet::new(
            "123456789a",
            vec![Capability::new("volume"), Capability::new("preferences")],
        );
        let matched = match_capabilities(&answer(), &query).unwrap();
        let names: Vec<&str> = matched.capabilities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["volume", "preferences"]);
    }

    #[test]
    fn test_match_missing_capability() {
        let query = ClientCapabilitySet::new("123456789a", vec![Capability::new("unknown")]);
        let err = match_capabilities(&answer(), &query).unwrap_err();
        assert_eq!(
            err,
            QueryError::CapabilityNotFound {
                client_id: "123456789a".to_string(),
                capability: "unknown".to_string(),
            }
        );
    }

    #[test]
    fn test_match_missing_client() {
        let query = ClientCapabilitySet::new("nobody", vec![Capability::new("preferences")]);
        let err = match_capabilities(&answer(), &query).unwrap_err();
        assert_eq!(err, QueryError::ClientNotFound("nobody".to_string()));
    }
}
