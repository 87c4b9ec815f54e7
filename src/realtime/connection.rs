use std::collections::{HashMap, VecDeque};

use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::{
    domain::events::{ChannelKind, CloseInfo, ConnectionState, SocketId, SocketSignal, TransportEvent},
    infra::secrets::redact_url,
};

use super::protocol::OutboundFrame;

const CHANNEL_MISSING_TOKEN: &str = "CHANNEL_MISSING_TOKEN";
const CHANNEL_INVALID_ENDPOINT: &str = "CHANNEL_INVALID_ENDPOINT";
const CHANNEL_OPEN_FAILED: &str = "CHANNEL_OPEN_FAILED";
const CHANNEL_SEND_REJECTED: &str = "CHANNEL_SEND_REJECTED";
const CHANNEL_TRANSPORT_FAILED: &str = "CHANNEL_TRANSPORT_FAILED";

pub const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("access token is missing")]
    MissingToken,
    #[error("channel target is missing")]
    MissingTarget,
    #[error("invalid websocket endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("socket transport failed: {0}")]
    Transport(String),
}

/// Write side of one physical socket.
pub trait SocketHandle: Send {
    /// Queues a text frame. `false` when the socket is already gone.
    fn send_text(&mut self, text: String) -> bool;
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens physical sockets. Everything the socket observes afterwards comes
/// back as `TransportEvent`s tagged with the given `SocketId`.
pub trait SocketConnector {
    fn open(&mut self, socket: SocketId, url: &str) -> Result<Box<dyn SocketHandle>, ChannelError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub frame_type: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Connected,
    Frame(InboundFrame),
    Disconnected(Option<CloseInfo>),
    Failed(ChannelError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub kind: ChannelKind,
    pub signal: ChannelSignal,
}

/// What a session reports to its owner: lifecycle changes plus decoded
/// payloads of the frame types it understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent<T> {
    Connected,
    Disconnected(Option<CloseInfo>),
    Failed(ChannelError),
    Payload(T),
}

impl ChannelSignal {
    /// Lifecycle signals pass through; frames go through `decode` and are
    /// dropped when it yields nothing.
    pub fn into_session_event<T>(
        self,
        decode: impl FnOnce(&InboundFrame) -> Option<T>,
    ) -> Option<SessionEvent<T>> {
        match self {
            Self::Connected => Some(SessionEvent::Connected),
            Self::Disconnected(close) => Some(SessionEvent::Disconnected(close)),
            Self::Failed(error) => Some(SessionEvent::Failed(error)),
            Self::Frame(frame) => decode(&frame).map(SessionEvent::Payload),
        }
    }
}

struct Slot {
    generation: u64,
    handle: Option<Box<dyn SocketHandle>>,
    state: ConnectionState,
}

/// Owns at most one live socket per channel kind. Opening a kind again closes
/// the previous socket first, and events from replaced sockets are dropped.
pub struct ConnectionManager<C> {
    api_base: String,
    connector: C,
    slots: HashMap<ChannelKind, Slot>,
    next_generation: u64,
    pending: VecDeque<ChannelEvent>,
}

impl<C: SocketConnector> ConnectionManager<C> {
    pub fn new(api_base: impl Into<String>, connector: C) -> Self {
        Self {
            api_base: api_base.into(),
            connector,
            slots: HashMap::new(),
            next_generation: 1,
            pending: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self, kind: ChannelKind) -> ConnectionState {
        self.slots
            .get(&kind)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    pub fn is_connected(&self, kind: ChannelKind) -> bool {
        self.state(kind) == ConnectionState::Connected
    }

    /// Opens the socket for `kind`, replacing any socket of the same kind.
    ///
    /// Returns `false` without touching the current socket when a
    /// precondition fails; the failure is queued as a `Failed` event.
    pub fn connect(
        &mut self,
        kind: ChannelKind,
        target: Option<&str>,
        access_token: Option<&str>,
    ) -> bool {
        let Some(token) = access_token.filter(|token| !token.trim().is_empty()) else {
            tracing::warn!(
                code = CHANNEL_MISSING_TOKEN,
                channel = %kind,
                "socket connect skipped: access token is missing"
            );
            self.queue_failure(kind, ChannelError::MissingToken);
            return false;
        };

        let built = endpoint_segments(kind, target)
            .and_then(|segments| websocket_url(&self.api_base, &segments, token));
        let url = match built {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(
                    code = CHANNEL_INVALID_ENDPOINT,
                    channel = %kind,
                    error = %error,
                    "socket connect skipped: endpoint could not be built"
                );
                self.queue_failure(kind, error);
                return false;
            }
        };

        self.close_slot(kind, reconnect_reason(kind));

        let generation = self.next_generation;
        self.next_generation += 1;
        let socket = SocketId { kind, generation };

        tracing::info!(
            channel = %kind,
            generation,
            url = %redact_url(url.as_str()),
            "opening socket"
        );

        match self.connector.open(socket, url.as_str()) {
            Ok(handle) => {
                self.slots.insert(
                    kind,
                    Slot {
                        generation,
                        handle: Some(handle),
                        state: ConnectionState::Connecting,
                    },
                );
                true
            }
            Err(error) => {
                tracing::warn!(
                    code = CHANNEL_OPEN_FAILED,
                    channel = %kind,
                    error = %error,
                    "socket open failed"
                );
                self.slots.insert(
                    kind,
                    Slot {
                        generation,
                        handle: None,
                        state: ConnectionState::Error,
                    },
                );
                self.queue_failure(kind, error);
                false
            }
        }
    }

    /// Closes the socket of `kind`. Returns whether a socket was closed; a
    /// second call is a no-op.
    pub fn disconnect(&mut self, kind: ChannelKind) -> bool {
        let closed = self.close_slot(kind, "Client disconnect");
        if closed {
            tracing::info!(channel = %kind, "socket disconnected");
        }

        closed
    }

    /// Serializes and sends `frame` when the socket of `kind` is open.
    pub fn send(&mut self, kind: ChannelKind, frame: &OutboundFrame) -> bool {
        if !self.is_connected(kind) {
            tracing::debug!(channel = %kind, "send rejected: socket is not connected");
            return false;
        }

        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    code = CHANNEL_SEND_REJECTED,
                    channel = %kind,
                    error = %error,
                    "outbound frame could not be serialized"
                );
                return false;
            }
        };

        self.slots
            .get_mut(&kind)
            .and_then(|slot| slot.handle.as_mut())
            .is_some_and(|handle| handle.send_text(text))
    }

    /// Maps a transport event onto the current socket of its kind. Events of
    /// replaced sockets and malformed frames are dropped.
    pub fn handle(&mut self, event: TransportEvent) -> Option<ChannelEvent> {
        let kind = event.socket.kind;
        let Some(slot) = self
            .slots
            .get_mut(&kind)
            .filter(|slot| slot.generation == event.socket.generation)
        else {
            tracing::debug!(
                channel = %kind,
                generation = event.socket.generation,
                "dropping event from a replaced socket"
            );
            return None;
        };

        let signal = match event.signal {
            SocketSignal::Opened => {
                slot.state = ConnectionState::Connected;
                ChannelSignal::Connected
            }
            SocketSignal::Text(text) => match parse_frame(&text) {
                Some(frame) => ChannelSignal::Frame(frame),
                None => {
                    tracing::debug!(channel = %kind, "ignoring frame without a type");
                    return None;
                }
            },
            SocketSignal::Closed(close) => {
                if slot.state != ConnectionState::Error {
                    slot.state = ConnectionState::Disconnected;
                }
                slot.handle = None;
                ChannelSignal::Disconnected(close)
            }
            SocketSignal::Failed(detail) => {
                tracing::warn!(
                    code = CHANNEL_TRANSPORT_FAILED,
                    channel = %kind,
                    error = %detail,
                    "socket transport failed"
                );
                slot.state = ConnectionState::Error;
                ChannelSignal::Failed(ChannelError::Transport(detail))
            }
        };

        Some(ChannelEvent { kind, signal })
    }

    /// Failures raised synchronously by `connect`, in the order they happened.
    pub fn take_pending(&mut self) -> Vec<ChannelEvent> {
        self.pending.drain(..).collect()
    }

    fn queue_failure(&mut self, kind: ChannelKind, error: ChannelError) {
        self.pending.push_back(ChannelEvent {
            kind,
            signal: ChannelSignal::Failed(error),
        });
    }

    fn close_slot(&mut self, kind: ChannelKind, reason: &str) -> bool {
        let Some(mut slot) = self.slots.remove(&kind) else {
            return false;
        };

        match slot.handle.take() {
            Some(mut handle) => {
                handle.close(CLOSE_NORMAL, reason);
                true
            }
            None => false,
        }
    }
}

fn reconnect_reason(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Chat => "Switching chat",
        ChannelKind::ChatList | ChannelKind::Status => "Reconnecting",
    }
}

fn endpoint_segments(kind: ChannelKind, target: Option<&str>) -> Result<Vec<&str>, ChannelError> {
    match kind {
        ChannelKind::Chat => {
            let target = target
                .map(str::trim)
                .filter(|target| !target.is_empty())
                .ok_or(ChannelError::MissingTarget)?;
            Ok(vec!["ws", "chat", target])
        }
        ChannelKind::ChatList => Ok(vec!["ws", "chat", "list"]),
        ChannelKind::Status => Ok(vec!["ws", "status"]),
    }
}

/// Derives the socket URL from the REST base: `http` becomes `ws`, `https`
/// becomes `wss`, the endpoint path gets a trailing slash and the token goes
/// into the `token` query parameter.
pub fn websocket_url(api_base: &str, segments: &[&str], token: &str) -> Result<Url, ChannelError> {
    let mut url =
        Url::parse(api_base).map_err(|error| ChannelError::InvalidEndpoint(error.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::InvalidEndpoint(format!(
                "unsupported scheme `{other}`"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::InvalidEndpoint(format!("cannot switch to `{scheme}`")))?;

    url.path_segments_mut()
        .map_err(|()| ChannelError::InvalidEndpoint("base url cannot carry a path".to_owned()))?
        .pop_if_empty()
        .extend(segments)
        .push("");

    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("token", token);

    Ok(url)
}

fn parse_frame(text: &str) -> Option<InboundFrame> {
    let body: Value = serde_json::from_str(text).ok()?;
    let frame_type = body.get("type")?.as_str()?.to_owned();

    Some(InboundFrame { frame_type, body })
}
