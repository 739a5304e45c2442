//! Session Tests (vap-skill)
//!
//! Tests for the skill lifecycle against a mock registry:
//! - Registration and language order
//! - Intent sync, including NLU directories
//! - Dispatching observed requests
//! - Notifications and queries
//! - Teardown on every exit path

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use vap_core::codec;
use vap_core::messages::{
    paths, ClientData, MsgNotification, MsgQuery, MsgRegisterIntents, MsgSkillRequest,
    NotificationData, RequestData, RequestSlot, RequestType,
};
use vap_core::{Capability, ClientCapabilitySet, LanguageTag, Method, ResponseCode};
use vap_discovery::DiscoveryConfig;
use vap_skill::prelude::*;
use vap_skill::{RegistryClient, ResubscribePolicy};
use vap_test_utils::{
    query_payload, wait_for, MockRegistry, RequestKind, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT,
};
use vap_transport::{Transport, TransportError};

const SKILL_ID: &str = "com.example.test";

fn langs() -> Vec<LanguageTag> {
    vec![
        LanguageTag::new("en").with_country("US"),
        LanguageTag::new("es"),
    ]
}

fn registry() -> Arc<MockRegistry> {
    Arc::new(MockRegistry::accepting(SKILL_ID, &langs()))
}

fn session_with(registry: &Arc<MockRegistry>, policy: ResubscribePolicy) -> Session {
    let transport: Arc<dyn Transport> = registry.clone();
    Session::new(
        RegistryClient::new(transport, registry.handle()),
        vap_core::SkillDescriptor::new(SKILL_ID, "Test skill"),
        vap_skill::NluSource::default(),
        policy,
    )
}

fn session(registry: &Arc<MockRegistry>) -> Session {
    session_with(registry, ResubscribePolicy::disabled())
}

fn skill_request(id: u64, request_type: &str, intent: &str) -> MsgSkillRequest {
    MsgSkillRequest {
        request_id: id,
        request_type: request_type.to_string(),
        client: ClientData {
            client_id: "123456789a".to_string(),
            system_id: None,
        },
        request: RequestData {
            intent: Some(intent.to_string()),
            slots: vec![RequestSlot {
                name: "person".to_string(),
                value: Some("Ana".to_string()),
            }],
            capabilities: vec![Capability::text("hello Ana")],
        },
    }
}

/// Answers every request with a fixed confidence and echoes the intent
struct FixedHandler {
    confidence: f32,
}

#[async_trait]
impl SkillHandler for FixedHandler {
    async fn can_you_answer(&self, _request: &InboundRequest) -> f32 {
        self.confidence
    }

    async fn request(&self, request: &InboundRequest) -> Vec<Capability> {
        let person = request.slot("person").unwrap_or("stranger");
        match request.intent.as_deref() {
            Some("hello") => vec![Capability::text(&format!("Hello, {}!", person))],
            _ => vec![],
        }
    }
}

async fn next_event(events: &mut mpsc::Receiver<DispatchEvent>) -> DispatchEvent {
    timeout(DEFAULT_TIMEOUT, events.recv())
        .await
        .expect("event timed out")
        .expect("event channel closed")
}

async fn wait_for_deletes(registry: &MockRegistry, n: usize) -> bool {
    wait_for(
        || async { registry.count(Method::Delete, &paths::skill(SKILL_ID)) >= n },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await
}

fn notifications(registry: &MockRegistry) -> Vec<NotificationData> {
    registry
        .requests_to(Method::Post, paths::NOTIFICATION)
        .iter()
        .flat_map(|req| {
            let msg: MsgNotification = codec::decode(&req.payload).unwrap();
            assert_eq!(msg.skill_id, SKILL_ID);
            msg.data
        })
        .collect()
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_registration_returns_languages_in_order() {
    let registry = registry();
    let session = session(&registry);

    let langs = session.register().await.unwrap();
    let rendered: Vec<String> = langs.iter().map(|l| l.to_string()).collect();
    assert_eq!(rendered, vec!["en-US", "es"]);
    assert_eq!(session.state(), SessionState::Registered);
    assert_eq!(session.languages(), langs);

    let connect = registry.requests_to(Method::Post, paths::CONNECT);
    assert_eq!(connect.len(), 1);
    assert_eq!(connect[0].path, "vap/skillRegistry/connect");
    assert!(connect[0].confirmable);
    let sent: vap_core::SkillDescriptor = codec::decode(&connect[0].payload).unwrap();
    assert_eq!(sent.id, SKILL_ID);
    assert_eq!(sent.protocol_version, vap_core::VAP_VERSION);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_registration_not_advanced() {
    let registry = registry();
    registry.respond(
        Method::Post,
        paths::CONNECT,
        ResponseCode::Forbidden,
        Bytes::new(),
    );
    let session = session(&registry);

    let err = session.register().await.unwrap_err();
    assert!(matches!(err, SkillError::Registration(ResponseCode::Forbidden)));
    assert_eq!(session.state(), SessionState::Resolved);

    // Never registered, so nothing to tear down
    session.close().await.unwrap();
    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 0);
}

#[tokio::test]
async fn test_registration_retry_after_rejection() {
    let registry = registry();
    registry.respond(
        Method::Post,
        paths::CONNECT,
        ResponseCode::ServiceUnavailable,
        Bytes::new(),
    );
    let session = session(&registry);
    assert!(session.register().await.is_err());

    registry.respond(
        Method::Post,
        paths::CONNECT,
        ResponseCode::Created,
        vap_test_utils::connect_payload(&langs()),
    );
    assert_eq!(session.register().await.unwrap().len(), 2);
    assert!(matches!(
        session.register().await,
        Err(SkillError::InvalidState(_))
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_registration_timeout_propagates() {
    let registry = registry();
    registry.time_out(Method::Post, paths::CONNECT);
    let session = session(&registry);

    let err = session.register().await.unwrap_err();
    assert!(matches!(err, SkillError::Transport(TransportError::Timeout)));
    assert_eq!(session.state(), SessionState::Resolved);
}

// ============================================================================
// Intent Sync
// ============================================================================

#[tokio::test]
async fn test_intent_sync_failure_tears_down_once() {
    let registry = registry();
    registry.respond(
        Method::Post,
        paths::REGISTER_INTENTS,
        ResponseCode::BadRequest,
        Bytes::new(),
    );
    let session = session(&registry);

    let err = session
        .start(FixedHandler { confidence: 1.0 })
        .await
        .unwrap_err();
    assert!(matches!(err, SkillError::IntentSync(ResponseCode::BadRequest)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
    assert!(!session.is_dispatching());

    session.close().await.unwrap();
    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
}

#[tokio::test]
async fn test_intent_sync_uploads_nlu_dir_for_registry_languages() {
    let dir = tempfile::tempdir().unwrap();
    let hello = |word: &str| {
        format!(
            "[intents.main.hello]\nutterances = [\"{} {{person}}\"]\nslots = {{ person = \"name\" }}\n\n[entities.name]\ndata = [{{ value = \"Ana\" }}]\n",
            word
        )
    };
    std::fs::write(dir.path().join("en.toml"), hello("hello")).unwrap();
    std::fs::write(dir.path().join("es.toml"), hello("hola")).unwrap();
    std::fs::write(dir.path().join("fr.toml"), hello("salut")).unwrap();
    std::fs::write(dir.path().join("README.toml"), "not = \"a language\"").unwrap();

    let registry = registry();
    let transport: Arc<dyn Transport> = registry.clone();
    let session = Session::new(
        RegistryClient::new(transport, registry.handle()),
        vap_core::SkillDescriptor::new(SKILL_ID, "Test skill"),
        vap_skill::NluSource::Directory(dir.path().to_path_buf()),
        ResubscribePolicy::disabled(),
    );

    session.register().await.unwrap();
    session.sync_intents().await.unwrap();
    assert_eq!(session.state(), SessionState::Synced);

    let uploads = registry.requests_to(Method::Post, paths::REGISTER_INTENTS);
    assert_eq!(uploads.len(), 1);
    let msg: MsgRegisterIntents = codec::decode(&uploads[0].payload).unwrap();
    assert_eq!(msg.skill_id, SKILL_ID);

    let uploaded: Vec<String> = msg.nlu_data.iter().map(|d| d.language.to_string()).collect();
    assert_eq!(uploaded, vec!["en", "es"]);
    assert_eq!(msg.nlu_data[1].intents[0].utterances[0].text, "hola {person}");

    // Re-sync replaces the data
    session.sync_intents().await.unwrap();
    assert_eq!(registry.count(Method::Post, paths::REGISTER_INTENTS), 2);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_intent_sync_nlu_error_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("en.toml"), "[intents.main.broken\n").unwrap();

    let registry = registry();
    let transport: Arc<dyn Transport> = registry.clone();
    let session = Session::new(
        RegistryClient::new(transport, registry.handle()),
        vap_core::SkillDescriptor::new(SKILL_ID, "Test skill"),
        vap_skill::NluSource::Directory(dir.path().to_path_buf()),
        ResubscribePolicy::disabled(),
    );

    let err = session
        .start(FixedHandler { confidence: 1.0 })
        .await
        .unwrap_err();
    assert!(matches!(err, SkillError::Nlu { .. }));
    assert_eq!(registry.count(Method::Post, paths::REGISTER_INTENTS), 0);
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
}

#[tokio::test]
async fn test_intent_sync_with_undeclared_entity_keeps_session() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("en.toml"),
        "[intents.main.weather]\nutterances = [\"weather in {place}\"]\nslots = { place = \"city\" }\n",
    )
    .unwrap();

    let registry = registry();
    let transport: Arc<dyn Transport> = registry.clone();
    let session = Session::new(
        RegistryClient::new(transport, registry.handle()),
        vap_core::SkillDescriptor::new(SKILL_ID, "Test skill"),
        vap_skill::NluSource::Directory(dir.path().to_path_buf()),
        ResubscribePolicy::disabled(),
    );

    session.start(FixedHandler { confidence: 1.0 }).await.unwrap();
    assert!(session.is_dispatching());
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 0);

    let uploads = registry.requests_to(Method::Post, paths::REGISTER_INTENTS);
    let msg: MsgRegisterIntents = codec::decode(&uploads[0].payload).unwrap();
    assert_eq!(msg.nlu_data[0].intents[0].slots[0].entity, "city");

    session.close().await.unwrap();
}

// ============================================================================
// Dispatching
// ============================================================================

#[tokio::test]
async fn test_can_you_answer_dispatched_with_clamped_confidence() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 1.7 }).await.unwrap();
    assert_eq!(session.state(), SessionState::Synced);
    assert!(session.is_dispatching());
    let mut events = session.take_events().unwrap();
    assert!(session.take_events().is_none());

    let observes: Vec<_> = registry
        .requests()
        .into_iter()
        .filter(|r| r.kind == RequestKind::Observe)
        .collect();
    assert_eq!(observes.len(), 1);
    assert_eq!(observes[0].request.path, "vap/skillRegistry/skills/com.example.test");

    let delivered = registry
        .push_request(SKILL_ID, &skill_request(7, "canYouAnswer", "hello"))
        .await;
    assert_eq!(delivered, 1);

    assert_eq!(
        next_event(&mut events).await,
        DispatchEvent::Answered {
            request_id: 7,
            request_type: RequestType::CanYouAnswer,
            client_id: "123456789a".to_string(),
        }
    );
    assert_eq!(
        notifications(&registry),
        vec![NotificationData::CanYouAnswer {
            request_id: 7,
            confidence: 1.0,
        }]
    );

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_request_dispatched_with_capabilities() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.5 }).await.unwrap();
    let mut events = session.take_events().unwrap();

    registry
        .push_request(SKILL_ID, &skill_request(8, "request", "hello"))
        .await;
    registry
        .push_request(SKILL_ID, &skill_request(9, "request", "goodbye"))
        .await;

    for _ in 0..2 {
        assert!(matches!(
            next_event(&mut events).await,
            DispatchEvent::Answered {
                request_type: RequestType::Request,
                ..
            }
        ));
    }

    let mut answers = notifications(&registry);
    answers.sort_by_key(|data| match data {
        NotificationData::Requested { request_id, .. } => *request_id,
        _ => 0,
    });
    assert_eq!(
        answers,
        vec![
            NotificationData::Requested {
                request_id: 8,
                capabilities: vec![Capability::text("Hello, Ana!")],
            },
            NotificationData::Requested {
                request_id: 9,
                capabilities: vec![],
            },
        ]
    );

    session.close().await.unwrap();
}

/// Answers with the capabilities the client sent
struct EchoHandler;

#[async_trait]
impl SkillHandler for EchoHandler {
    async fn can_you_answer(&self, _request: &InboundRequest) -> f32 {
        1.0
    }

    async fn request(&self, request: &InboundRequest) -> Vec<Capability> {
        request.capabilities.capabilities.clone()
    }
}

#[tokio::test]
async fn test_request_with_binary_capability_dispatched() {
    let registry = registry();
    let session = session(&registry);
    session.start(EchoHandler).await.unwrap();
    let mut events = session.take_events().unwrap();

    let sound = Capability::new("sound").with("data", vec![0xffu8, 0xfe, 0x00]);
    let mut request = skill_request(11, "request", "play");
    request.request.capabilities = vec![sound.clone()];
    registry.push_request(SKILL_ID, &request).await;

    assert_eq!(
        next_event(&mut events).await,
        DispatchEvent::Answered {
            request_id: 11,
            request_type: RequestType::Request,
            client_id: "123456789a".to_string(),
        }
    );
    assert_eq!(
        notifications(&registry),
        vec![NotificationData::Requested {
            request_id: 11,
            capabilities: vec![sound],
        }]
    );
    assert_eq!(registry.observer_count(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_discriminator_skipped() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.3 }).await.unwrap();
    let mut events = session.take_events().unwrap();

    registry
        .push_request(SKILL_ID, &skill_request(1, "shutdown", "hello"))
        .await;
    registry
        .push(&paths::skill(SKILL_ID), Bytes::from_static(&[0xc1]))
        .await;
    registry
        .push_request(SKILL_ID, &skill_request(2, "canYouAnswer", "hello"))
        .await;

    match next_event(&mut events).await {
        DispatchEvent::Answered { request_id, .. } => assert_eq!(request_id, 2),
        other => panic!("Expected answer, got {:?}", other),
    }
    assert_eq!(notifications(&registry).len(), 1);
    assert_eq!(registry.observer_count(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_answer_failure_reported() {
    let registry = registry();
    registry.time_out(Method::Post, paths::NOTIFICATION);
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.3 }).await.unwrap();
    let mut events = session.take_events().unwrap();

    registry
        .push_request(SKILL_ID, &skill_request(3, "canYouAnswer", "hello"))
        .await;

    match next_event(&mut events).await {
        DispatchEvent::Failed { request_id, error } => {
            assert_eq!(request_id, 3);
            assert!(error.contains("timeout"));
        }
        other => panic!("Expected failure, got {:?}", other),
    }

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_resubscribe_after_subscription_loss() {
    let registry = registry();
    let policy = ResubscribePolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    };
    let session = session_with(&registry, policy);
    session.start(FixedHandler { confidence: 0.9 }).await.unwrap();
    let mut events = session.take_events().unwrap();

    registry.drop_observers();

    assert_eq!(next_event(&mut events).await, DispatchEvent::SubscriptionLost);
    assert_eq!(
        next_event(&mut events).await,
        DispatchEvent::Resubscribed { attempt: 1 }
    );
    assert_eq!(registry.count(Method::Get, &paths::skill(SKILL_ID)), 2);

    registry
        .push_request(SKILL_ID, &skill_request(4, "canYouAnswer", "hello"))
        .await;
    assert!(matches!(
        next_event(&mut events).await,
        DispatchEvent::Answered { request_id: 4, .. }
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_subscription_loss_without_resubscribe_stops() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.9 }).await.unwrap();
    let mut events = session.take_events().unwrap();

    registry.drop_observers();

    assert_eq!(next_event(&mut events).await, DispatchEvent::SubscriptionLost);
    assert!(matches!(
        next_event(&mut events).await,
        DispatchEvent::Stopped { .. }
    ));
    assert_eq!(registry.count(Method::Get, &paths::skill(SKILL_ID)), 1);

    session.close().await.unwrap();
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
}

#[tokio::test]
async fn test_rejected_subscription_yields_error() {
    let registry = registry();
    registry.set_observe_code(ResponseCode::Unauthorized);
    let session = session(&registry);
    session.register().await.unwrap();
    session.sync_intents().await.unwrap();

    let mut stream = session.observe().await.unwrap();
    assert!(matches!(
        stream.recv().await,
        Some(Err(SkillError::Subscription(ResponseCode::Unauthorized)))
    ));
    assert!(stream.recv().await.is_none());

    session.close().await.unwrap();
}

// ============================================================================
// Notification / Query
// ============================================================================

#[tokio::test]
async fn test_notify_ignores_response_code() {
    let registry = registry();
    registry.respond(
        Method::Post,
        paths::NOTIFICATION,
        ResponseCode::InternalServerError,
        Bytes::new(),
    );
    let session = session(&registry);
    session.register().await.unwrap();

    session
        .notify(ClientCapabilitySet::new(
            "123456789a",
            vec![Capability::text("reminder")],
        ))
        .await
        .unwrap();

    assert_eq!(
        notifications(&registry),
        vec![NotificationData::StandAlone {
            client_id: "123456789a".to_string(),
            capabilities: vec![Capability::text("reminder")],
        }]
    );

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_query_capability() {
    let registry = registry();
    registry.respond(
        Method::Get,
        paths::QUERY,
        ResponseCode::Content,
        query_payload(vec![ClientCapabilitySet::new(
            "123456789a",
            vec![
                Capability::new("preferences").with("color", "blue"),
                Capability::new("preferences").with("color", "red"),
            ],
        )]),
    );
    let session = session(&registry);
    session.register().await.unwrap();

    let found = session
        .query_capability("123456789a", Capability::new("preferences"))
        .await
        .unwrap();
    assert_eq!(found.name, "preferences");
    assert_eq!(found.get("color"), Some(&vap_core::Value::from("blue")));

    let queries = registry.requests_to(Method::Get, paths::QUERY);
    let sent: MsgQuery = codec::decode(&queries[0].payload).unwrap();
    assert_eq!(sent.skill_id, SKILL_ID);
    assert_eq!(sent.data[0].client_id, "123456789a");

    let err = session
        .query_capability("123456789a", Capability::new("unknown"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SkillError::Query(QueryError::CapabilityNotFound { ref capability, .. }) if capability == "unknown"
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_query_unexpected_code() {
    let registry = registry();
    let session = session(&registry);
    session.register().await.unwrap();

    // No query route: the mock answers 4.04
    let err = session
        .query(ClientCapabilitySet::new("123456789a", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SkillError::Query(QueryError::UnexpectedCode(ResponseCode::NotFound))
    ));

    session.close().await.unwrap();
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_cancels_observer_then_deletes() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.9 }).await.unwrap();

    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_dispatching());

    assert!(
        wait_for(
            || async { registry.deregistrations() == 1 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await
    );
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);

    // Closing twice sends nothing more
    session.close().await.unwrap();
    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
}

#[tokio::test]
async fn test_rejected_teardown_still_closes() {
    let registry = registry();
    registry.respond(
        Method::Delete,
        &paths::skill(SKILL_ID),
        ResponseCode::NotFound,
        Bytes::new(),
    );
    let session = session(&registry);
    session.register().await.unwrap();

    let err = session.close().await.unwrap_err();
    assert!(matches!(err, SkillError::Teardown(ResponseCode::NotFound)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.notify(ClientCapabilitySet::new("c", vec![])).await,
        Err(SkillError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_drop_unclosed_session_tears_down() {
    let registry = registry();
    let session = session(&registry);
    session.start(FixedHandler { confidence: 0.9 }).await.unwrap();

    drop(session);

    assert!(wait_for_deletes(&registry, 1).await);
    assert!(
        wait_for(
            || async { registry.deregistrations() == 1 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.count(Method::Delete, &paths::skill(SKILL_ID)), 1);
}

// ============================================================================
// Builder
// ============================================================================

#[tokio::test]
async fn test_builder_discovers_and_starts() {
    let registry = registry();
    registry.add_discovery_response(registry.peer(), "<vap>;rt=\"vap-skill-registry\"");

    let session = SkillBuilder::new(SKILL_ID, "Test skill")
        .transport(registry.clone())
        .discovery(DiscoveryConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .auth_token("opaque")
        .resubscribe(ResubscribePolicy::disabled())
        .start(FixedHandler { confidence: 0.2 })
        .await
        .unwrap();

    assert_eq!(session.handle(), &registry.handle());
    assert_eq!(session.state(), SessionState::Synced);

    let connect = registry.requests_to(Method::Post, paths::CONNECT);
    let sent: vap_core::SkillDescriptor = codec::decode(&connect[0].payload).unwrap();
    assert_eq!(sent.auth_token.as_deref(), Some("opaque"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_builder_static_registry_skips_discovery() {
    let registry = registry();

    let session = SkillBuilder::new(SKILL_ID, "Test skill")
        .transport(registry.clone())
        .registry(registry.handle())
        .build()
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Resolved);
    assert!(registry.requests().is_empty());
}

#[tokio::test]
async fn test_builder_discovery_failure() {
    let registry = registry();

    let err = SkillBuilder::new(SKILL_ID, "Test skill")
        .transport(registry.clone())
        .discovery(DiscoveryConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, SkillError::Discovery(_)));
    assert_eq!(registry.count(Method::Post, paths::CONNECT), 0);
}
