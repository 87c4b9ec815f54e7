//! One-to-one message stream addressed by the other participant's username.

use std::time::{Duration, Instant};

use crate::domain::{
    events::ChannelKind,
    ids::{MessageId, UserId},
    profile::LocalProfile,
    typing::{TypingDebouncer, TypingTransition, DEFAULT_TYPING_IDLE},
};

use super::{
    connection::{ChannelEvent, ConnectionManager, SessionEvent, SocketConnector},
    protocol::{decode_chat_frame, ChatFrame, OutboundFrame},
};

const CHAT_OPEN_DEFERRED: &str = "CHAT_OPEN_DEFERRED";
const CHAT_SEND_REJECTED_NOT_CONNECTED: &str = "CHAT_SEND_REJECTED_NOT_CONNECTED";

pub type DirectChatEvent = SessionEvent<ChatFrame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    MissingPeer,
    MissingProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Connecting,
    /// Preconditions are not met yet; no socket was requested.
    Deferred(DeferReason),
    /// The connection manager refused the attempt and queued the failure.
    Failed,
}

#[derive(Debug, Clone)]
pub struct DirectChatSession {
    peer: Option<String>,
    profile: Option<LocalProfile>,
    typing: TypingDebouncer,
    peer_typing: bool,
}

impl Default for DirectChatSession {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}

impl DirectChatSession {
    pub fn new(typing_idle: Duration) -> Self {
        Self {
            peer: None,
            profile: None,
            typing: TypingDebouncer::new(typing_idle),
            peer_typing: false,
        }
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn is_peer_typing(&self) -> bool {
        self.peer_typing
    }

    pub fn is_connected<C: SocketConnector>(&self, conn: &ConnectionManager<C>) -> bool {
        conn.is_connected(ChannelKind::Chat)
    }

    /// Connects to the chat with `peer`. Needs both the peer and the local
    /// profile; without either the attempt is deferred and nothing is opened.
    pub fn open<C: SocketConnector>(
        &mut self,
        conn: &mut ConnectionManager<C>,
        peer: Option<&str>,
        access_token: Option<&str>,
        profile: Option<&LocalProfile>,
    ) -> OpenOutcome {
        let Some(peer) = peer.map(str::trim).filter(|peer| !peer.is_empty()) else {
            tracing::info!(code = CHAT_OPEN_DEFERRED, "chat open deferred: peer is unknown");
            return OpenOutcome::Deferred(DeferReason::MissingPeer);
        };
        let Some(profile) = profile else {
            tracing::info!(
                code = CHAT_OPEN_DEFERRED,
                peer,
                "chat open deferred: local profile is not loaded"
            );
            return OpenOutcome::Deferred(DeferReason::MissingProfile);
        };

        self.typing.cancel();
        self.peer_typing = false;
        self.peer = Some(peer.to_owned());
        self.profile = Some(profile.clone());

        if conn.connect(ChannelKind::Chat, Some(peer), access_token) {
            OpenOutcome::Connecting
        } else {
            OpenOutcome::Failed
        }
    }

    /// Tears the socket down. The typing timer is cancelled first so no stop
    /// frame can follow the close.
    pub fn close<C: SocketConnector>(&mut self, conn: &mut ConnectionManager<C>) {
        self.typing.cancel();
        self.peer_typing = false;
        self.peer = None;
        conn.disconnect(ChannelKind::Chat);
    }

    /// Dispatches a text message. `false` means the socket was not open and
    /// nothing was sent; the caller marks its optimistic entry failed.
    pub fn send_message<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        text: &str,
        temp_id: &MessageId,
    ) -> bool {
        self.dispatch(
            conn,
            OutboundFrame::Message {
                text: Some(text.to_owned()),
                image: None,
                temp_id: temp_id.clone(),
            },
        )
    }

    /// Dispatches an image given as a `data:` URL.
    pub fn send_image<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        data_url: &str,
        caption: Option<&str>,
        temp_id: &MessageId,
    ) -> bool {
        self.dispatch(
            conn,
            OutboundFrame::Message {
                text: caption.map(str::to_owned),
                image: Some(data_url.to_owned()),
                temp_id: temp_id.clone(),
            },
        )
    }

    pub fn send_typing<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        is_typing: bool,
    ) -> bool {
        conn.send(ChannelKind::Chat, &OutboundFrame::Typing { is_typing })
    }

    /// Acknowledges server-assigned ids as read. Temp ids never leave the
    /// client.
    pub fn send_read_receipt<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        message_ids: &[MessageId],
    ) -> bool {
        let message_ids: Vec<MessageId> = message_ids
            .iter()
            .filter(|id| !id.is_temp())
            .cloned()
            .collect();
        if message_ids.is_empty() {
            return false;
        }

        conn.send(ChannelKind::Chat, &OutboundFrame::ReadReceipt { message_ids })
    }

    pub fn delete_message<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        message_id: &MessageId,
        delete_for_everyone: bool,
    ) -> bool {
        conn.send(
            ChannelKind::Chat,
            &OutboundFrame::DeleteMessage {
                message_id: message_id.clone(),
                delete_for_everyone,
            },
        )
    }

    pub fn edit_message<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        message_id: &MessageId,
        new_text: &str,
    ) -> bool {
        conn.send(
            ChannelKind::Chat,
            &OutboundFrame::UpdateMessage {
                message_id: message_id.clone(),
                new_text: new_text.to_owned(),
            },
        )
    }

    /// Records local input activity; the first event of a burst sends a
    /// typing start.
    pub fn note_input<C: SocketConnector>(&mut self, conn: &mut ConnectionManager<C>, now: Instant) {
        if self.typing.on_input(now) == Some(TypingTransition::Started) {
            self.send_typing(conn, true);
        }
    }

    /// Sends the typing stop once the idle interval has passed.
    pub fn poll_typing<C: SocketConnector>(&mut self, conn: &mut ConnectionManager<C>, now: Instant) {
        if self.typing.poll(now) == Some(TypingTransition::Stopped) {
            self.send_typing(conn, false);
        }
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Decodes a chat channel event. Typing, read receipts and join or leave
    /// notices echoed back for the local user are swallowed.
    pub fn handle(&mut self, event: ChannelEvent) -> Option<DirectChatEvent> {
        if event.kind != ChannelKind::Chat {
            return None;
        }

        let event = event.signal.into_session_event(decode_chat_frame)?;
        match &event {
            SessionEvent::Disconnected(_) | SessionEvent::Failed(_) => self.peer_typing = false,
            SessionEvent::Payload(ChatFrame::Typing { user_id, is_typing }) => {
                if self.is_local(user_id.as_ref()) {
                    return None;
                }
                self.peer_typing = *is_typing;
            }
            SessionEvent::Payload(
                ChatFrame::ReadReceipt { user_id, .. }
                | ChatFrame::ParticipantPresence { user_id, .. },
            ) => {
                if self.is_local(user_id.as_ref()) {
                    return None;
                }
            }
            _ => {}
        }

        Some(event)
    }

    fn dispatch<C: SocketConnector>(&self, conn: &mut ConnectionManager<C>, frame: OutboundFrame) -> bool {
        let sent = conn.send(ChannelKind::Chat, &frame);
        if !sent {
            tracing::warn!(
                code = CHAT_SEND_REJECTED_NOT_CONNECTED,
                peer = self.peer.as_deref().unwrap_or_default(),
                "message not sent: chat socket is not connected"
            );
        }

        sent
    }

    fn is_local(&self, user_id: Option<&UserId>) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|profile| profile.is_self(user_id))
    }
}
