//! Common test helpers and utilities for VAP tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - [`MockRegistry`], an in-memory [`Transport`] scripted per resource
//! - Payload builders for the messages a registry sends

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use vap_core::codec::{self, Encoding};
use vap_core::messages::{paths, MsgConnectResponse, MsgQueryResponse, MsgSkillRequest};
use vap_core::{ClientCapabilitySet, LanguageTag, Method, RegistryHandle, ResponseCode};
use vap_transport::{Observation, Request, Response, Transport, TransportError};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || async { flag.load(Ordering::SeqCst) },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait with notification - more efficient than polling
pub async fn wait_with_notify(notify: &Notify, max_wait: Duration) -> bool {
    timeout(max_wait, notify.notified()).await.is_ok()
}

// ============================================================================
// Payload Builders
// ============================================================================

/// Connect answer listing `langs`, tuple-encoded
pub fn connect_payload(langs: &[LanguageTag]) -> Bytes {
    let resp = MsgConnectResponse {
        langs: langs.to_vec(),
        unique_authentication_token: None,
        connection_authentication_token: None,
    };
    codec::encode(&resp, Encoding::Positional).expect("connect response encodes")
}

/// Query answer, map-encoded
pub fn query_payload(data: Vec<ClientCapabilitySet>) -> Bytes {
    codec::encode(&MsgQueryResponse { data }, Encoding::Named).expect("query response encodes")
}

/// Observed request, tuple-encoded as the registry pushes it
pub fn push_payload(request: &MsgSkillRequest) -> Bytes {
    codec::encode(request, Encoding::Positional).expect("skill request encodes")
}

// ============================================================================
// Mock Registry
// ============================================================================

/// How a request reached the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Request,
    Observe,
    Discover,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub request: Request,
}

#[derive(Debug, Clone)]
enum Route {
    Respond(ResponseCode, Bytes),
    Timeout,
}

struct Observer {
    path: String,
    tx: mpsc::Sender<Response>,
}

/// In-memory registry implementing [`Transport`].
///
/// Routes are keyed by method and resource below the registry base path.
/// Unrouted requests get 4.04 Not Found.
pub struct MockRegistry {
    handle: RegistryHandle,
    peer: SocketAddr,
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
    observers: Mutex<Vec<Observer>>,
    observe_code: Mutex<ResponseCode>,
    discovery: Mutex<Vec<Response>>,
    deregistrations: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl MockRegistry {
    pub fn new() -> Self {
        let peer = SocketAddr::from(([127, 0, 0, 1], vap_core::DEFAULT_PORT));
        Self {
            handle: RegistryHandle::new("127.0.0.1", vap_core::DEFAULT_BASE_PATH),
            peer,
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            observe_code: Mutex::new(ResponseCode::Content),
            discovery: Mutex::new(Vec::new()),
            deregistrations: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Registry accepting `skill_id` at every stage
    pub fn accepting(skill_id: &str, langs: &[LanguageTag]) -> Self {
        let registry = Self::new();
        registry.respond(
            Method::Post,
            paths::CONNECT,
            ResponseCode::Created,
            connect_payload(langs),
        );
        registry.respond(
            Method::Post,
            paths::REGISTER_INTENTS,
            ResponseCode::Created,
            Bytes::new(),
        );
        registry.respond(
            Method::Post,
            paths::NOTIFICATION,
            ResponseCode::Created,
            Bytes::new(),
        );
        registry.respond(
            Method::Delete,
            &paths::skill(skill_id),
            ResponseCode::Deleted,
            Bytes::new(),
        );
        registry
    }

    /// Handle pointing at this registry
    pub fn handle(&self) -> RegistryHandle {
        self.handle.clone()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn full_path(&self, resource: &str) -> String {
        self.handle.resource(resource)
    }

    /// Answer every `method` on `resource` with `code` and `payload`
    pub fn respond(&self, method: Method, resource: &str, code: ResponseCode, payload: Bytes) {
        self.routes.lock().insert(
            (method, self.full_path(resource)),
            Route::Respond(code, payload),
        );
    }

    /// Never answer `method` on `resource`; the request times out
    pub fn time_out(&self, method: Method, resource: &str) {
        self.routes
            .lock()
            .insert((method, self.full_path(resource)), Route::Timeout);
    }

    /// Code observations are answered with; a non-success code ends them
    /// right after registration
    pub fn set_observe_code(&self, code: ResponseCode) {
        *self.observe_code.lock() = code;
    }

    /// Add a `.well-known/core` answer from `peer`
    pub fn add_discovery_response(&self, peer: SocketAddr, body: &str) {
        let response = Response::new(ResponseCode::Content, peer)
            .with_payload(Bytes::copy_from_slice(body.as_bytes()));
        self.discovery.lock().push(response);
    }

    /// Push a notification to every live observation of `resource`.
    /// Returns how many observations received it.
    pub async fn push(&self, resource: &str, payload: Bytes) -> usize {
        let path = self.full_path(resource);
        let targets: Vec<mpsc::Sender<Response>> = {
            let mut observers = self.observers.lock();
            observers.retain(|o| !o.tx.is_closed());
            observers
                .iter()
                .filter(|o| o.path == path)
                .map(|o| o.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in targets {
            let response = Response::new(ResponseCode::Content, self.peer).with_payload(payload.clone());
            if tx.send(response).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push an observed skill request to the skill's observe resource
    pub async fn push_request(&self, skill_id: &str, request: &MsgSkillRequest) -> usize {
        self.push(&paths::skill(skill_id), push_payload(request)).await
    }

    /// End every live observation, as if the subscription was lost
    pub fn drop_observers(&self) {
        self.observers.lock().clear();
    }

    /// Live observations
    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|o| !o.tx.is_closed());
        observers.len()
    }

    /// Observations cancelled by the client
    pub fn deregistrations(&self) -> u32 {
        self.deregistrations.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for `method` on `resource`
    pub fn requests_to(&self, method: Method, resource: &str) -> Vec<Request> {
        let path = self.full_path(resource);
        self.requests
            .lock()
            .iter()
            .filter(|r| r.request.method == method && r.request.path == path)
            .map(|r| r.request.clone())
            .collect()
    }

    pub fn count(&self, method: Method, resource: &str) -> usize {
        self.requests_to(method, resource).len()
    }

    /// Wait until at least `n` requests have been received
    pub async fn wait_for_requests(&self, n: usize, max_wait: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.requests.lock().len() >= n {
                return true;
            }
            let remaining = max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return false;
            }
            let _ = timeout(remaining.min(DEFAULT_CHECK_INTERVAL), self.notify.notified()).await;
        }
    }

    fn record(&self, kind: RequestKind, request: &Request) {
        self.requests.lock().push(RecordedRequest {
            kind,
            request: request.clone(),
        });
        self.notify.notify_waiters();
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockRegistry {
    async fn request(&self, request: Request) -> vap_transport::Result<Response> {
        self.record(RequestKind::Request, &request);

        let route = self
            .routes
            .lock()
            .get(&(request.method, request.path.clone()))
            .cloned();
        match route {
            Some(Route::Respond(code, payload)) => {
                Ok(Response::new(code, self.peer).with_payload(payload))
            }
            Some(Route::Timeout) => Err(TransportError::Timeout),
            None => Ok(Response::new(ResponseCode::NotFound, self.peer)),
        }
    }

    async fn observe(&self, request: Request) -> vap_transport::Result<Observation> {
        self.record(RequestKind::Observe, &request);

        let (tx, rx) = mpsc::channel(64);
        let code = *self.observe_code.lock();

        // Registration acknowledgement, empty body
        let ack = Response::new(code, self.peer).with_observe(0);
        let _ = tx.try_send(ack);

        if code.is_success() {
            self.observers.lock().push(Observer {
                path: request.path.clone(),
                tx,
            });
        }

        let (observation, cancelled) = Observation::new(rx);
        let deregistrations = self.deregistrations.clone();
        tokio::spawn(async move {
            if cancelled.await.is_ok() {
                deregistrations.fetch_add(1, Ordering::SeqCst);
            }
        });

        Ok(observation)
    }

    async fn discover(
        &self,
        request: Request,
        _timeout: Duration,
    ) -> vap_transport::Result<Vec<Response>> {
        self.record(RequestKind::Discover, &request);
        Ok(self.discovery.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unrouted_is_not_found() {
        let registry = MockRegistry::new();
        let req = Request::to_registry(&registry.handle(), Method::Get, "nothing");
        let resp = registry.request(req).await.unwrap();
        assert_eq!(resp.code, ResponseCode::NotFound);
        assert_eq!(registry.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_push_reaches_observer() {
        let registry = MockRegistry::new();
        let req = Request::to_registry(&registry.handle(), Method::Get, &paths::skill("s"));
        let mut obs = registry.observe(req).await.unwrap();

        let ack = obs.recv().await.unwrap();
        assert!(ack.payload.is_empty());

        assert_eq!(registry.push(&paths::skill("s"), Bytes::from_static(b"x")).await, 1);
        assert_eq!(obs.recv().await.unwrap().payload.as_ref(), b"x");

        drop(obs);
        assert!(wait_for(
            || async { registry.deregistrations() == 1 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await);
        assert_eq!(registry.observer_count(), 0);
    }
}
