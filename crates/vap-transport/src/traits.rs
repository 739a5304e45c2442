//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use vap_core::{Method, RegistryHandle, ResponseCode};

use crate::error::Result;

/// An outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub host: String,
    pub port: u16,
    /// Resource path, segments separated by `/`
    pub path: String,
    pub queries: Vec<String>,
    pub payload: Bytes,
    /// Send as a confirmable message
    pub confirmable: bool,
}

impl Request {
    pub fn new(method: Method, host: &str, port: u16, path: &str) -> Self {
        Self {
            method,
            host: host.to_string(),
            port,
            path: path.to_string(),
            queries: Vec::new(),
            payload: Bytes::new(),
            confirmable: true,
        }
    }

    /// Request for a resource below the registry base path
    pub fn to_registry(handle: &RegistryHandle, method: Method, resource: &str) -> Self {
        Self::new(method, &handle.host, handle.port, &handle.resource(resource))
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.queries.push(query.to_string());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn non_confirmable(mut self) -> Self {
        self.confirmable = false;
        self
    }
}

/// A response, or a notification pushed on an observation
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Bytes,
    /// Address the response came from
    pub peer: SocketAddr,
    /// Observe sequence number, set on notifications
    pub observe: Option<u32>,
}

impl Response {
    pub fn new(code: ResponseCode, peer: SocketAddr) -> Self {
        Self {
            code,
            payload: Bytes::new(),
            peer,
            observe: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_observe(mut self, seq: u32) -> Self {
        self.observe = Some(seq);
        self
    }
}

/// A live observe subscription.
///
/// Yields every response pushed for the subscription. Cancelling (or
/// dropping) tells the transport to deregister; an observation is never
/// restarted.
pub struct Observation {
    rx: mpsc::Receiver<Response>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Observation {
    /// Create an observation fed by `rx`; the returned receiver fires when
    /// the observation is cancelled or dropped
    pub fn new(rx: mpsc::Receiver<Response>) -> (Self, oneshot::Receiver<()>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            Self {
                rx,
                cancel: Some(cancel_tx),
            },
            cancel_rx,
        )
    }

    /// Next pushed response, `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<Response> {
        self.rx.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Stream for Observation {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Response>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Main transport trait
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response
    async fn request(&self, request: Request) -> Result<Response>;

    /// Register an observation on a resource
    async fn observe(&self, request: Request) -> Result<Observation>;

    /// Send a (possibly multicast) request and collect every response that
    /// arrives within `timeout`
    async fn discover(&self, request: Request, timeout: Duration) -> Result<Vec<Response>>;

    /// Send a (possibly multicast) request and return the first response
    /// `accept` takes, without waiting out the rest of `timeout`
    async fn discover_first(
        &self,
        request: Request,
        timeout: Duration,
        accept: &mut (dyn for<'r> FnMut(&'r Response) -> bool + Send),
    ) -> Result<Option<Response>> {
        let responses = self.discover(request, timeout).await?;
        Ok(responses.into_iter().find(|response| accept(response)))
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, request: Request) -> Result<Response> {
        (**self).request(request).await
    }

    async fn observe(&self, request: Request) -> Result<Observation> {
        (**self).observe(request).await
    }

    async fn discover(&self, request: Request, timeout: Duration) -> Result<Vec<Response>> {
        (**self).discover(request, timeout).await
    }

    async fn discover_first(
        &self,
        request: Request,
        timeout: Duration,
        accept: &mut (dyn for<'r> FnMut(&'r Response) -> bool + Send),
    ) -> Result<Option<Response>> {
        (**self).discover_first(request, timeout, accept).await
    }
}
