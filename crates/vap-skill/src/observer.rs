//! Requests pushed by the registry
//!
//! The registry pushes each request on the skill's observe resource as a
//! tuple `(requestId, requestType, client, request)`. The discriminator at
//! position 1 decides how the rest is handled; pushes that cannot be
//! understood are logged and skipped so one bad message never ends the
//! subscription.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, error, warn};
use vap_core::codec::{self, tuple_element};
use vap_core::messages::{ClientData, MsgSkillRequest, RequestSlot, RequestType, REQUEST_TYPE_POSITION};
use vap_core::ClientCapabilitySet;
use vap_transport::{Observation, Response};

use crate::error::{Result, SkillError};

/// A request routed to this skill
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub request_id: u64,
    pub request_type: RequestType,
    pub client: ClientData,
    /// Matched intent; absent when the registry found none
    pub intent: Option<String>,
    pub slots: Vec<RequestSlot>,
    /// Capabilities sent by the client, keyed by its id
    pub capabilities: ClientCapabilitySet,
}

impl InboundRequest {
    /// Value of a named slot
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.value.as_deref())
    }
}

/// What one pushed payload turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Request(InboundRequest),
    /// Empty body, sent when the subscription is registered
    Acknowledgement,
    /// Discriminator this skill does not know
    Unknown(String),
}

/// Interpret one pushed payload
pub fn parse_push(payload: &[u8]) -> vap_core::Result<Push> {
    if payload.is_empty() {
        return Ok(Push::Acknowledgement);
    }

    let discriminator = tuple_element(payload, REQUEST_TYPE_POSITION)?;
    let Some(name) = discriminator.as_str() else {
        return Ok(Push::Unknown(format!("{:?}", discriminator)));
    };
    let Some(request_type) = RequestType::from_discriminator(name) else {
        return Ok(Push::Unknown(name.to_string()));
    };

    let msg: MsgSkillRequest = codec::decode(payload)?;
    let capabilities = ClientCapabilitySet {
        client_id: msg.client.client_id.clone(),
        capabilities: msg.request.capabilities,
    };

    Ok(Push::Request(InboundRequest {
        request_id: msg.request_id,
        request_type,
        client: msg.client,
        intent: msg.request.intent,
        slots: msg.request.slots,
        capabilities,
    }))
}

/// Lazy, non-restartable sequence of requests from one observation.
///
/// Ends when the subscription is lost; a new one needs a fresh observe.
/// Dropping the stream deregisters the observation.
pub struct RequestStream {
    skill_id: String,
    observation: Observation,
    ended: bool,
}

impl RequestStream {
    pub fn new(skill_id: &str, observation: Observation) -> Self {
        Self {
            skill_id: skill_id.to_string(),
            observation,
            ended: false,
        }
    }

    pub fn skill_id(&self) -> &str {
        &self.skill_id
    }

    /// Next request. `None` once the subscription has ended; a rejected
    /// subscription yields one error first.
    pub async fn recv(&mut self) -> Option<Result<InboundRequest>> {
        self.next().await
    }

    /// Deregister the observation
    pub fn cancel(&mut self) {
        self.observation.cancel();
        self.ended = true;
    }

    fn process(&mut self, response: Response) -> Option<Result<InboundRequest>> {
        if !response.code.is_success() {
            error!(
                "Subscription of {} ended by registry: {}",
                self.skill_id, response.code
            );
            self.ended = true;
            return Some(Err(SkillError::Subscription(response.code)));
        }

        match parse_push(&response.payload) {
            Ok(Push::Request(request)) => {
                debug!(
                    "Request {} ({}) for {}",
                    request.request_id,
                    request.request_type.as_str(),
                    self.skill_id
                );
                Some(Ok(request))
            }
            Ok(Push::Acknowledgement) => {
                debug!("Subscription of {} acknowledged", self.skill_id);
                None
            }
            Ok(Push::Unknown(kind)) => {
                warn!("Skipping push of unknown type {:?} for {}", kind, self.skill_id);
                None
            }
            Err(e) => {
                warn!("Skipping undecodable push for {}: {}", self.skill_id, e);
                None
            }
        }
    }
}

impl Stream for RequestStream {
    type Item = Result<InboundRequest>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.ended {
                return Poll::Ready(None);
            }

            let response = match self.observation.poll_next_unpin(cx) {
                Poll::Ready(Some(response)) => response,
                Poll::Ready(None) => {
                    debug!("Subscription of {} closed", self.skill_id);
                    self.ended = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            };

            if let Some(item) = self.process(response) {
                return Poll::Ready(Some(item));
            }
        }
    }
}

impl std::fmt::Debug for RequestStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStream")
            .field("skill_id", &self.skill_id)
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vap_core::codec::Encoding;
    use vap_core::messages::RequestData;
    use vap_core::Capability;

    fn push(request_type: &str) -> Vec<u8> {
        let msg = MsgSkillRequest {
            request_id: 7,
            request_type: request_type.to_string(),
            client: ClientData {
                client_id: "123456789a".to_string(),
                system_id: None,
            },
            request: RequestData {
                intent: Some("hello".to_string()),
                slots: vec![RequestSlot {
                    name: "person".to_string(),
                    value: Some("Ana".to_string()),
                }],
                capabilities: vec![Capability::text("hello Ana")],
            },
        };
        codec::encode(&msg, Encoding::Positional).unwrap().to_vec()
    }

    #[test]
    fn test_parse_can_you_answer() {
        match parse_push(&push("canYouAnswer")).unwrap() {
            Push::Request(req) => {
                assert_eq!(req.request_id, 7);
                assert_eq!(req.request_type, RequestType::CanYouAnswer);
                assert_eq!(req.capabilities.client_id, "123456789a");
                assert_eq!(req.capabilities.capabilities[0].name, "text");
                assert_eq!(req.intent.as_deref(), Some("hello"));
                assert_eq!(req.slot("person"), Some("Ana"));
                assert_eq!(req.slot("place"), None);
            }
            other => panic!("Expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_request() {
        match parse_push(&push("request")).unwrap() {
            Push::Request(req) => assert_eq!(req.request_type, RequestType::Request),
            other => panic!("Expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert_eq!(
            parse_push(&push("shutdown")).unwrap(),
            Push::Unknown("shutdown".to_string())
        );
        assert_eq!(parse_push(&[]).unwrap(), Push::Acknowledgement);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_push(&[0xc1]).is_err());
        // a tuple too short to carry a discriminator
        let short = codec::encode(&(1u64,), Encoding::Positional).unwrap();
        assert!(parse_push(&short).is_err());
    }
}
