//! Answering observed requests
//!
//! A [`SkillHandler`] decides how the skill answers. The dispatcher task
//! reads the [`RequestStream`], runs the handler and sends each answer back
//! through the notification endpoint. Outcomes are reported as
//! [`DispatchEvent`]s.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vap_core::messages::{NotificationData, RequestType};
use vap_core::Capability;

use crate::client::RegistryClient;
use crate::observer::{InboundRequest, RequestStream};

/// Application logic of a skill
#[async_trait]
pub trait SkillHandler: Send + Sync + 'static {
    /// How confident the skill is that it can answer, in `[0.0, 1.0]`.
    /// Values outside the range are clamped.
    async fn can_you_answer(&self, request: &InboundRequest) -> f32;

    /// Answer a request; an empty list when no intent matched
    async fn request(&self, request: &InboundRequest) -> Vec<Capability>;
}

/// Outcome of dispatching, reported to the application
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// Answer delivered to the registry
    Answered {
        request_id: u64,
        request_type: RequestType,
        client_id: String,
    },
    /// Answer could not be delivered
    Failed { request_id: u64, error: String },
    /// The subscription ended
    SubscriptionLost,
    /// A fresh subscription replaced the lost one
    Resubscribed { attempt: u32 },
    /// Dispatching stopped for good
    Stopped { reason: String },
}

/// How the dispatcher recovers a lost subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubscribePolicy {
    /// Fresh observe attempts before giving up; 0 disables resubscribing
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ResubscribePolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before the given attempt (1-based), doubling up to the maximum
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

pub(crate) fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Running dispatcher task
pub(crate) struct Dispatcher {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        client: RegistryClient,
        skill_id: String,
        handler: Arc<dyn SkillHandler>,
        policy: ResubscribePolicy,
        stream: RequestStream,
        events: mpsc::Sender<DispatchEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            client,
            skill_id,
            handler,
            policy,
            stream,
            events,
            shutdown_rx,
        ));
        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Stop dispatching and deregister the subscription
    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(Duration::from_secs(1), &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

async fn run(
    client: RegistryClient,
    skill_id: String,
    handler: Arc<dyn SkillHandler>,
    policy: ResubscribePolicy,
    mut stream: RequestStream,
    events: mpsc::Sender<DispatchEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Dispatching requests for {}", skill_id);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                stream.cancel();
                debug!("Dispatcher of {} shut down", skill_id);
                return;
            }
            next = stream.recv() => next,
        };

        match next {
            Some(Ok(request)) => {
                let client = client.clone();
                let skill_id = skill_id.clone();
                let handler = handler.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let event = answer(&client, &skill_id, handler.as_ref(), request).await;
                    report(&events, event);
                });
            }
            Some(Err(e)) => warn!("Subscription of {} failed: {}", skill_id, e),
            None => {
                report(&events, DispatchEvent::SubscriptionLost);

                let resubscribed = tokio::select! {
                    _ = &mut shutdown => return,
                    resubscribed = resubscribe(&client, &skill_id, &policy, &events) => resubscribed,
                };
                match resubscribed {
                    Some(fresh) => stream = fresh,
                    None => {
                        let reason = format!(
                            "subscription lost, {} resubscribe attempts failed",
                            policy.max_attempts
                        );
                        error!("Dispatcher of {} stopped: {}", skill_id, reason);
                        report(&events, DispatchEvent::Stopped { reason });
                        return;
                    }
                }
            }
        }
    }
}

async fn resubscribe(
    client: &RegistryClient,
    skill_id: &str,
    policy: &ResubscribePolicy,
    events: &mpsc::Sender<DispatchEvent>,
) -> Option<RequestStream> {
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.backoff(attempt)).await;

        match client.observe(skill_id).await {
            Ok(stream) => {
                info!("Resubscribed {} (attempt {})", skill_id, attempt);
                report(events, DispatchEvent::Resubscribed { attempt });
                return Some(stream);
            }
            Err(e) => warn!(
                "Resubscribe of {} failed (attempt {}/{}): {}",
                skill_id, attempt, policy.max_attempts, e
            ),
        }
    }
    None
}

/// Run the handler for one request and send its answer
pub(crate) async fn answer(
    client: &RegistryClient,
    skill_id: &str,
    handler: &dyn SkillHandler,
    request: InboundRequest,
) -> DispatchEvent {
    let data = match request.request_type {
        RequestType::CanYouAnswer => NotificationData::CanYouAnswer {
            request_id: request.request_id,
            confidence: clamp_confidence(handler.can_you_answer(&request).await),
        },
        RequestType::Request => NotificationData::Requested {
            request_id: request.request_id,
            capabilities: handler.request(&request).await,
        },
    };

    match client.notify(skill_id, vec![data]).await {
        Ok(()) => DispatchEvent::Answered {
            request_id: request.request_id,
            request_type: request.request_type,
            client_id: request.client.client_id,
        },
        Err(e) => {
            error!("Failed to answer request {}: {}", request.request_id, e);
            DispatchEvent::Failed {
                request_id: request.request_id,
                error: e.to_string(),
            }
        }
    }
}

fn report(events: &mpsc::Sender<DispatchEvent>, event: DispatchEvent) {
    if let Err(e) = events.try_send(event) {
        debug!("Dispatch event not delivered: {}", e);
    }
}
