use chrono::{DateTime, Utc};

use crate::domain::{chat::ChatListUpdate, events::ChannelKind};

use super::{
    connection::{ChannelEvent, ConnectionManager, SessionEvent, SocketConnector},
    protocol::{decode_chat_list_frame, OutboundFrame},
};

pub type ChatListEvent = SessionEvent<ChatListUpdate>;

/// Live summary stream of the signed-in user's conversations. The channel is
/// scoped by the token alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatListSession;

impl ChatListSession {
    pub fn open<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        access_token: Option<&str>,
    ) -> bool {
        conn.connect(ChannelKind::ChatList, None, access_token)
    }

    pub fn close<C: SocketConnector>(&self, conn: &mut ConnectionManager<C>) {
        conn.disconnect(ChannelKind::ChatList);
    }

    /// Asks the server to push a fresh list. `false` when not connected.
    pub fn request_refresh<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        now: DateTime<Utc>,
    ) -> bool {
        conn.send(
            ChannelKind::ChatList,
            &OutboundFrame::RefreshChatlist { timestamp: now },
        )
    }

    pub fn handle(&self, event: ChannelEvent) -> Option<ChatListEvent> {
        if event.kind != ChannelKind::ChatList {
            return None;
        }

        event.signal.into_session_event(decode_chat_list_frame)
    }
}
