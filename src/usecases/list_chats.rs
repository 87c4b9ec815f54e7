use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::domain::chat::Conversation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatListSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
}

pub trait ChatListSource {
    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatListSourceError>;
}

impl<T> ChatListSource for &T
where
    T: ChatListSource + ?Sized,
{
    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatListSourceError> {
        (*self).list_conversations()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChatsError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
}

/// Fetches the full conversation list, most recently active first.
pub fn list_chats(source: &dyn ChatListSource) -> Result<Vec<Conversation>, ListChatsError> {
    let mut chats = source.list_conversations().map_err(map_source_error)?;
    chats.sort_by(|left, right| last_activity(right).cmp(&last_activity(left)));

    Ok(chats)
}

fn last_activity(chat: &Conversation) -> Option<DateTime<Utc>> {
    chat.updated_at.or_else(|| {
        chat.last_message
            .as_ref()
            .and_then(|last_message| last_message.created_at)
    })
}

fn map_source_error(error: ChatListSourceError) -> ListChatsError {
    match error {
        ChatListSourceError::Unauthorized => ListChatsError::Unauthorized,
        ChatListSourceError::Unavailable => ListChatsError::TemporarilyUnavailable,
        ChatListSourceError::InvalidData => ListChatsError::DataContractViolation,
    }
}

/// Rate limit for full list re-fetches. The first request fires at once;
/// requests inside the interval collapse into one deferred refresh that fires
/// when the interval has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshThrottle {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: bool,
}

impl RefreshThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    /// `true` when the caller should re-fetch now.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.is_open(now) {
            self.fire(now);
            return true;
        }

        self.pending = true;
        false
    }

    /// `true` once a deferred refresh is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.pending && self.is_open(now) {
            self.fire(now);
            return true;
        }

        false
    }

    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }

        self.last_fired.map(|fired| fired + self.interval)
    }

    fn is_open(&self, now: Instant) -> bool {
        self.last_fired
            .is_none_or(|fired| now.saturating_duration_since(fired) >= self.interval)
    }

    fn fire(&mut self, now: Instant) {
        self.last_fired = Some(now);
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::{chat::Participant, ids::ConversationId};

    struct StubSource {
        result: Result<Vec<Conversation>, ChatListSourceError>,
        calls: Mutex<usize>,
    }

    impl StubSource {
        fn with_result(result: Result<Vec<Conversation>, ChatListSourceError>) -> Self {
            Self {
                result,
                calls: Mutex::new(0),
            }
        }
    }

    impl ChatListSource for StubSource {
        fn list_conversations(&self) -> Result<Vec<Conversation>, ChatListSourceError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.result.clone()
        }
    }

    fn chat(id: &str, updated_secs: Option<i64>) -> Conversation {
        Conversation {
            id: ConversationId::new(id),
            other_user: Participant {
                id: None,
                username: format!("user{id}"),
                first_name: None,
                last_name: None,
                is_online: false,
            },
            last_message: None,
            unread_count: 0,
            is_online: None,
            updated_at: updated_secs.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }

    #[test]
    fn orders_by_latest_activity_with_undated_entries_last() {
        let source = StubSource::with_result(Ok(vec![
            chat("1", Some(100)),
            chat("2", None),
            chat("3", Some(300)),
        ]));

        let chats = list_chats(&source).expect("list should succeed");

        let ids: Vec<&str> = chats.iter().map(|chat| chat.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(*source.calls.lock().expect("calls lock"), 1);
    }

    #[test]
    fn maps_unauthorized_error() {
        let source = StubSource::with_result(Err(ChatListSourceError::Unauthorized));

        let err = list_chats(&source).expect_err("must fail");

        assert_eq!(err, ListChatsError::Unauthorized);
    }

    #[test]
    fn maps_unavailable_error_to_temporarily_unavailable() {
        let source = StubSource::with_result(Err(ChatListSourceError::Unavailable));

        let err = list_chats(&source).expect_err("must fail");

        assert_eq!(err, ListChatsError::TemporarilyUnavailable);
    }

    #[test]
    fn maps_invalid_data_error_to_contract_violation() {
        let source = StubSource::with_result(Err(ChatListSourceError::InvalidData));

        let err = list_chats(&source).expect_err("must fail");

        assert_eq!(err, ListChatsError::DataContractViolation);
    }

    #[test]
    fn first_refresh_fires_immediately() {
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));

        assert!(throttle.request(Instant::now()));
        assert_eq!(throttle.deadline(), None);
        assert!(!throttle.poll(Instant::now()));
    }

    #[test]
    fn burst_collapses_into_one_deferred_refresh() {
        let start = Instant::now();
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        assert!(throttle.request(start));

        assert!(!throttle.request(start + Duration::from_millis(100)));
        assert!(!throttle.request(start + Duration::from_millis(200)));
        assert!(!throttle.request(start + Duration::from_millis(900)));
        assert_eq!(throttle.deadline(), Some(start + Duration::from_secs(1)));

        assert!(!throttle.poll(start + Duration::from_millis(999)));
        assert!(throttle.poll(start + Duration::from_secs(1)));
        assert!(!throttle.poll(start + Duration::from_secs(5)));
    }

    #[test]
    fn request_after_quiet_interval_fires_again() {
        let start = Instant::now();
        let mut throttle = RefreshThrottle::new(Duration::from_secs(1));
        throttle.request(start);

        assert!(throttle.request(start + Duration::from_millis(1_500)));
    }
}
