use crate::domain::events::ChannelKind;

use super::{
    connection::{ChannelEvent, ConnectionManager, SessionEvent, SocketConnector},
    protocol::{decode_status_frame, UserStatus},
};

pub type PresenceEvent = SessionEvent<UserStatus>;

/// Online/offline broadcasts for all users. Opening the channel also marks
/// the local user online on the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceSession;

impl PresenceSession {
    pub fn open<C: SocketConnector>(
        &self,
        conn: &mut ConnectionManager<C>,
        access_token: Option<&str>,
    ) -> bool {
        conn.connect(ChannelKind::Status, None, access_token)
    }

    pub fn close<C: SocketConnector>(&self, conn: &mut ConnectionManager<C>) {
        conn.disconnect(ChannelKind::Status);
    }

    pub fn handle(&self, event: ChannelEvent) -> Option<PresenceEvent> {
        if event.kind != ChannelKind::Status {
            return None;
        }

        event.signal.into_session_event(decode_status_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{opened, text, FakeConnector};

    #[test]
    fn status_frames_become_presence_events() {
        let mut manager = ConnectionManager::new("http://localhost:8000", FakeConnector::default());
        let session = PresenceSession;

        assert!(session.open(&mut manager, Some("tok")));
        let socket = manager.connector().last_opened(ChannelKind::Status);
        manager.handle(opened(socket));
        let event = manager
            .handle(text(
                socket,
                r#"{"type": "user_status", "user_id": "2", "username": "bob", "is_online": false}"#,
            ))
            .expect("typed frame");

        let Some(SessionEvent::Payload(status)) = session.handle(event) else {
            panic!("expected status payload");
        };
        assert_eq!(status.username, "bob");
        assert!(!status.is_online);
        assert_eq!(
            manager.connector().opened_urls(),
            vec!["ws://localhost:8000/ws/status/?token=tok".to_owned()]
        );
    }

    #[test]
    fn unrelated_status_frames_are_ignored() {
        let mut manager = ConnectionManager::new("http://localhost:8000", FakeConnector::default());
        let session = PresenceSession;
        session.open(&mut manager, Some("tok"));
        let socket = manager.connector().last_opened(ChannelKind::Status);
        manager.handle(opened(socket));

        let event = manager
            .handle(text(socket, r#"{"type": "update_status", "status": "busy"}"#))
            .expect("typed frame");

        assert_eq!(session.handle(event), None);
    }

    #[test]
    fn close_disconnects_only_the_status_channel() {
        let mut manager = ConnectionManager::new("http://localhost:8000", FakeConnector::default());
        let session = PresenceSession;
        session.open(&mut manager, Some("tok"));
        manager.connect(ChannelKind::ChatList, None, Some("tok"));

        session.close(&mut manager);

        let closed = manager.connector().closed_sockets();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, ChannelKind::Status);
    }
}
