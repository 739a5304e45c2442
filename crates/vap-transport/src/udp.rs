//! CoAP over UDP transport
//!
//! One socket serves every request of a session. Responses are matched to
//! requests by token; observe notifications and multicast answers are
//! forwarded to a per-token channel. Requests are sent once: there is no
//! retransmission, a request that gets no answer times out.

use async_trait::async_trait;
use bytes::Bytes;
use coap_lite::{CoapOption, MessageClass, MessageType, ObserveOption, Packet};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vap_core::ResponseCode;

use crate::error::{Result, TransportError};
use crate::traits::{Observation, Request, Response, Transport};

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind
    pub bind_addr: String,
    /// How long to wait for the response to a request
    pub request_timeout: Duration,
    /// Maximum packet size
    pub max_packet_size: usize,
    /// Notifications buffered per observation before new ones are dropped
    pub observe_buffer: usize,
    /// TTL of multicast requests
    pub multicast_ttl: u32,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            request_timeout: Duration::from_secs(5),
            max_packet_size: 65507, // Max UDP payload
            observe_buffer: 64,
            multicast_ttl: 1,
        }
    }
}

/// State shared between the transport and its receive loop
struct Shared {
    socket: UdpSocket,
    /// Requests waiting for a single response
    pending: DashMap<Vec<u8>, oneshot::Sender<Response>>,
    /// Observations and discovery requests, which take many responses
    streams: DashMap<Vec<u8>, mpsc::Sender<Response>>,
    message_id: AtomicU16,
    token: AtomicU32,
}

impl Shared {
    fn next_message_id(&self) -> u16 {
        self.message_id.fetch_add(1, Ordering::Relaxed)
    }

    fn next_token(&self) -> Vec<u8> {
        self.token.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec()
    }

    fn build_packet(
        &self,
        request: &Request,
        token: &[u8],
        observe: Option<ObserveOption>,
    ) -> Packet {
        let mut packet = Packet::new();
        packet.header.set_type(if request.confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        });
        packet.header.code = MessageClass::from(request.method);
        packet.header.message_id = self.next_message_id();
        packet.set_token(token.to_vec());

        for segment in request.path.split('/').filter(|s| !s.is_empty()) {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
        for query in &request.queries {
            packet.add_option(CoapOption::UriQuery, query.as_bytes().to_vec());
        }
        if let Some(option) = observe {
            packet.set_observe_value(option as u32);
        }
        packet.payload = request.payload.to_vec();
        packet
    }

    async fn send(&self, packet: &Packet, target: SocketAddr) -> Result<()> {
        let data = packet
            .to_bytes()
            .map_err(|e| TransportError::InvalidPacket(format!("{:?}", e)))?;
        self.socket
            .send_to(&data, target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn handle_packet(&self, mut packet: Packet, from: SocketAddr) {
        let message_type = packet.header.get_type();
        let message_id = packet.header.message_id;

        let Some(code) = ResponseCode::from_class(packet.header.code) else {
            match (message_type, packet.header.code) {
                (MessageType::Reset, _) => debug!("Reset from {} for mid {}", from, message_id),
                (_, MessageClass::Empty) => {}
                (_, class) => debug!("Ignoring {:?} request from {}", class, from),
            }
            if message_type == MessageType::Confirmable {
                self.reply(empty_message(MessageType::Reset, message_id), from)
                    .await;
            }
            return;
        };

        let token = packet.get_token().to_vec();
        let response = Response {
            code,
            observe: packet.get_observe_value().and_then(|value| value.ok()),
            payload: Bytes::from(std::mem::take(&mut packet.payload)),
            peer: from,
        };
        let delivered = self.deliver(&token, response);

        if message_type == MessageType::Confirmable {
            let reply = if delivered {
                MessageType::Acknowledgement
            } else {
                MessageType::Reset
            };
            self.reply(empty_message(reply, message_id), from).await;
        }
    }

    /// Hand a response to whoever waits on its token
    fn deliver(&self, token: &[u8], response: Response) -> bool {
        if let Some(stream) = self.streams.get(token).map(|s| s.clone()) {
            return match stream.try_send(response) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Observer for token {:02x?} is lagging, dropping notification", token);
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    self.streams.remove(token);
                    false
                }
            };
        }

        if let Some((_, tx)) = self.pending.remove(token) {
            return tx.send(response).is_ok();
        }

        debug!("Unmatched response for token {:02x?}", token);
        false
    }

    async fn reply(&self, packet: Packet, to: SocketAddr) {
        if let Err(e) = self.send(&packet, to).await {
            warn!("Failed to answer {}: {}", to, e);
        }
    }
}

/// Empty ACK or RST answering `message_id`
fn empty_message(message_type: MessageType, message_id: u16) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(message_type);
    packet.header.code = MessageClass::Empty;
    packet.header.message_id = message_id;
    packet
}

/// CoAP client over a single UDP socket
pub struct UdpTransport {
    shared: Arc<Shared>,
    config: UdpConfig,
    receiver: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(UdpConfig {
            bind_addr: addr.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Bind with config
    pub async fn bind_with_config(config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(&config.bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        let local = socket.local_addr()?;
        if local.is_ipv4() {
            if let Err(e) = socket.set_multicast_ttl_v4(config.multicast_ttl) {
                warn!("Failed to set multicast TTL: {}", e);
            }
        }
        info!("UDP bound to {}", local);

        // Start counters somewhere unpredictable so tokens differ between runs
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();

        let shared = Arc::new(Shared {
            socket,
            pending: DashMap::new(),
            streams: DashMap::new(),
            message_id: AtomicU16::new(seed as u16),
            token: AtomicU32::new(seed.rotate_left(16)),
        });

        let receiver = tokio::spawn(receive_loop(shared.clone(), config.max_packet_size));

        Ok(Self {
            shared,
            config,
            receiver,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.shared.socket.local_addr().map_err(TransportError::Io)
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let want_v4 = self.local_addr()?.is_ipv4();
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", host, e)))?
            .find(|addr| addr.is_ipv4() == want_v4)
            .ok_or_else(|| TransportError::InvalidAddress(host.to_string()))
    }

    /// Send a discovery request and hand every answer to `on_answer` until it
    /// breaks or `timeout` passes
    async fn collect_answers(
        &self,
        request: Request,
        timeout: Duration,
        mut on_answer: impl FnMut(Response) -> ControlFlow<()> + Send,
    ) -> Result<()> {
        let target = self.resolve(&request.host, request.port).await?;
        let token = self.shared.next_token();
        let packet = self.shared.build_packet(&request, &token, None);

        let (tx, mut rx) = mpsc::channel(self.config.observe_buffer.max(1));
        self.shared.streams.insert(token.clone(), tx);

        if let Err(e) = self.shared.send(&packet, target).await {
            self.shared.streams.remove(&token);
            return Err(e);
        }

        let mut answers = 0usize;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                received = rx.recv() => match received {
                    Some(response) => {
                        answers += 1;
                        if on_answer(response).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.shared.streams.remove(&token);
        debug!("Discovery request to {} got {} answers", target, answers);
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
        // End every open observation and outstanding request
        self.shared.streams.clear();
        self.shared.pending.clear();
    }
}

async fn receive_loop(shared: Arc<Shared>, max_packet_size: usize) {
    let mut buf = vec![0u8; max_packet_size];

    loop {
        let (len, from) = match shared.socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("UDP receive error: {}", e);
                continue;
            }
        };

        match Packet::from_bytes(&buf[..len]) {
            Ok(packet) => shared.handle_packet(packet, from).await,
            Err(e) => debug!("Dropping undecodable datagram from {}: {:?}", from, e),
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn request(&self, request: Request) -> Result<Response> {
        let target = self.resolve(&request.host, request.port).await?;
        let token = self.shared.next_token();
        let packet = self.shared.build_packet(&request, &token, None);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(token.clone(), tx);

        debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.path,
            target,
            request.payload.len()
        );
        if let Err(e) = self.shared.send(&packet, target).await {
            self.shared.pending.remove(&token);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => {
                debug!("{} {} <- {}", request.method, request.path, response.code);
                Ok(response)
            }
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.remove(&token);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn observe(&self, request: Request) -> Result<Observation> {
        let target = self.resolve(&request.host, request.port).await?;
        let token = self.shared.next_token();
        let packet = self
            .shared
            .build_packet(&request, &token, Some(ObserveOption::Register));

        let (tx, rx) = mpsc::channel(self.config.observe_buffer.max(1));
        self.shared.streams.insert(token.clone(), tx);

        if let Err(e) = self.shared.send(&packet, target).await {
            self.shared.streams.remove(&token);
            return Err(e);
        }
        info!("Observing {} on {}", request.path, target);

        let (observation, cancelled) = Observation::new(rx);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let _ = cancelled.await;
            shared.streams.remove(&token);

            let deregister = shared.build_packet(&request, &token, Some(ObserveOption::Deregister));
            match shared.send(&deregister, target).await {
                Ok(()) => debug!("Deregistered observation of {}", request.path),
                Err(e) => warn!("Failed to deregister observation of {}: {}", request.path, e),
            }
        });

        Ok(observation)
    }

    async fn discover(&self, request: Request, timeout: Duration) -> Result<Vec<Response>> {
        let mut responses = Vec::new();
        self.collect_answers(request, timeout, |response| {
            responses.push(response);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(responses)
    }

    async fn discover_first(
        &self,
        request: Request,
        timeout: Duration,
        accept: &mut (dyn for<'r> FnMut(&'r Response) -> bool + Send),
    ) -> Result<Option<Response>> {
        let mut first = None;
        self.collect_answers(request, timeout, |response| {
            if accept(&response) {
                first = Some(response);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;
        Ok(first)
    }
}
