//! Skill session lifecycle
//!
//! A [`Session`] owns everything one registration needs: the resolved
//! registry, the skill descriptor, the NLU source and the shared transport.
//! Its state only moves forward:
//!
//! ```text
//! Resolved -> Registered -> Synced -> Closed
//!                 \            \
//!                  +-> Failed <-+
//! ```
//!
//! Once the registry accepted the skill, teardown is sent exactly once:
//! on [`Session::close`], when [`Session::start`] fails after registering,
//! or when an unclosed session is dropped.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vap_core::messages::NotificationData;
use vap_core::{Capability, ClientCapabilitySet, LanguageTag, RegistryHandle, SkillDescriptor};

use crate::client::RegistryClient;
use crate::error::{Result, SkillError};
use crate::handler::{DispatchEvent, Dispatcher, ResubscribePolicy, SkillHandler};
use crate::nlu::NluSource;
use crate::observer::RequestStream;

/// Capacity of the dispatch event channel
const EVENT_BUFFER: usize = 64;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registry known, skill not registered yet
    Resolved,
    /// Registry accepted the skill
    Registered,
    /// Intents uploaded
    Synced,
    /// Torn down
    Closed,
    /// A stage after registration failed; the skill was torn down
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Resolved => "resolved",
            SessionState::Registered => "registered",
            SessionState::Synced => "synced",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One skill registered with one registry
pub struct Session {
    client: RegistryClient,
    descriptor: SkillDescriptor,
    nlu: NluSource,
    policy: ResubscribePolicy,
    state: Mutex<SessionState>,
    langs: Mutex<Vec<LanguageTag>>,
    registered: AtomicBool,
    torn_down: AtomicBool,
    dispatcher: Mutex<Option<Dispatcher>>,
    events: Mutex<Option<mpsc::Receiver<DispatchEvent>>>,
}

impl Session {
    pub fn new(
        client: RegistryClient,
        descriptor: SkillDescriptor,
        nlu: NluSource,
        policy: ResubscribePolicy,
    ) -> Self {
        Self {
            client,
            descriptor,
            nlu,
            policy,
            state: Mutex::new(SessionState::Resolved),
            langs: Mutex::new(Vec::new()),
            registered: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    pub fn skill_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn handle(&self) -> &RegistryHandle {
        self.client.handle()
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Languages the registry answered with, in registry order
    pub fn languages(&self) -> Vec<LanguageTag> {
        self.langs.lock().clone()
    }

    /// Whether a dispatcher is answering requests
    pub fn is_dispatching(&self) -> bool {
        self.dispatcher.lock().is_some()
    }

    fn require(&self, operation: &str, allowed: &[SessionState]) -> Result<SessionState> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(SkillError::InvalidState(format!(
                "{} is not allowed while the session is {}",
                operation, state
            )))
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        debug!("Session {}: {} -> {}", self.descriptor.id, *current, state);
        *current = state;
    }

    /// Register the skill. A rejected registration leaves the session
    /// resolved so it can be retried.
    pub async fn register(&self) -> Result<Vec<LanguageTag>> {
        self.require("register", &[SessionState::Resolved])?;

        let langs = self.client.register(&self.descriptor).await?;
        self.registered.store(true, Ordering::SeqCst);
        *self.langs.lock() = langs.clone();
        self.set_state(SessionState::Registered);
        Ok(langs)
    }

    /// Upload the NLU dataset for the registry's languages. May be repeated
    /// to replace the uploaded data.
    pub async fn sync_intents(&self) -> Result<()> {
        self.require(
            "sync_intents",
            &[SessionState::Registered, SessionState::Synced],
        )?;

        let dataset = self.nlu.resolve(&self.languages())?;
        self.client
            .sync_intents(&self.descriptor.id, &dataset)
            .await?;
        self.set_state(SessionState::Synced);
        Ok(())
    }

    /// Subscribe to the requests routed to this skill
    pub async fn observe(&self) -> Result<RequestStream> {
        self.require("observe", &[SessionState::Synced])?;
        self.client.observe(&self.descriptor.id).await
    }

    /// Push capabilities to a client
    pub async fn notify(&self, set: ClientCapabilitySet) -> Result<()> {
        self.notify_data(vec![NotificationData::from(set)]).await
    }

    /// Send raw notification entries
    pub async fn notify_data(&self, data: Vec<NotificationData>) -> Result<()> {
        self.require("notify", &[SessionState::Registered, SessionState::Synced])?;
        self.client.notify(&self.descriptor.id, data).await
    }

    /// Query capabilities of a client
    pub async fn query(&self, set: ClientCapabilitySet) -> Result<ClientCapabilitySet> {
        self.require("query", &[SessionState::Registered, SessionState::Synced])?;
        self.client.query(&self.descriptor.id, set).await
    }

    /// Query one capability of a client
    pub async fn query_capability(
        &self,
        client_id: &str,
        capability: Capability,
    ) -> Result<Capability> {
        self.require("query", &[SessionState::Registered, SessionState::Synced])?;
        self.client
            .query_capability(&self.descriptor.id, client_id, capability)
            .await
    }

    /// Run the remaining stages and answer requests with `handler`.
    ///
    /// Registration errors are returned as-is. A failure after the registry
    /// accepted the skill tears it down and leaves the session failed.
    pub async fn start<H: SkillHandler>(&self, handler: H) -> Result<()> {
        self.start_shared(Arc::new(handler)).await
    }

    /// [`start`](Self::start) with a handler shared with the application
    pub async fn start_shared(&self, handler: Arc<dyn SkillHandler>) -> Result<()> {
        if self.is_dispatching() {
            return Err(SkillError::InvalidState(
                "session is already dispatching".to_string(),
            ));
        }

        if self.state() == SessionState::Resolved {
            self.register().await?;
        }

        let stream = match self.start_stages().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Starting skill {} failed: {}", self.descriptor.id, e);
                if let Err(teardown) = self.teardown().await {
                    warn!("Teardown of {} failed: {}", self.descriptor.id, teardown);
                }
                self.set_state(SessionState::Failed);
                return Err(e);
            }
        };

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let dispatcher = Dispatcher::spawn(
            self.client.clone(),
            self.descriptor.id.clone(),
            handler,
            self.policy.clone(),
            stream,
            events_tx,
        );
        *self.dispatcher.lock() = Some(dispatcher);
        *self.events.lock() = Some(events_rx);

        info!("Skill {} started", self.descriptor.id);
        Ok(())
    }

    async fn start_stages(&self) -> Result<RequestStream> {
        if self.state() == SessionState::Registered {
            self.sync_intents().await?;
        }
        self.observe().await
    }

    /// Dispatch outcomes of a started session. Can be taken once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<DispatchEvent>> {
        self.events.lock().take()
    }

    /// Stop dispatching and tear the skill down.
    ///
    /// The session ends closed even when the registry rejects the teardown;
    /// the rejection is returned.
    pub async fn close(&self) -> Result<()> {
        if matches!(self.state(), SessionState::Closed | SessionState::Failed) {
            return Ok(());
        }

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.stop().await;
        }

        let result = self.teardown().await;
        self.set_state(SessionState::Closed);
        if result.is_ok() {
            info!("Skill {} closed", self.descriptor.id);
        }
        result
    }

    /// DELETE the skill, at most once and only after registration
    async fn teardown(&self) -> Result<()> {
        if !self.claim_teardown() {
            return Ok(());
        }
        self.client.close(&self.descriptor.id).await
    }

    fn claim_teardown(&self) -> bool {
        self.registered.load(Ordering::SeqCst) && !self.torn_down.swap(true, Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.abort();
        }

        if !self.claim_teardown() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.client.clone();
                let skill_id = self.descriptor.id.clone();
                debug!("Session of {} dropped unclosed, tearing down", skill_id);
                runtime.spawn(async move {
                    if let Err(e) = client.close(&skill_id).await {
                        warn!("Teardown of dropped session {} failed: {}", skill_id, e);
                    }
                });
            }
            Err(_) => warn!(
                "Session of {} dropped outside a runtime; registry not notified",
                self.descriptor.id
            ),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("skill_id", &self.descriptor.id)
            .field("registry", self.client.handle())
            .field("state", &self.state())
            .finish()
    }
}
