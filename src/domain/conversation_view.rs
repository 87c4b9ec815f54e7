use std::collections::{HashMap, HashSet};

use super::{
    ids::{ConversationId, MessageId},
    message::{InboundMessage, Message, MessageStatus},
    profile::LocalProfile,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUiState {
    Empty,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub message: Message,
    pub is_own: bool,
}

/// Result of merging one history page into the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageApplied {
    /// Rows the rendered sequence grew by. After an older page these rows sit
    /// above everything that was visible before.
    pub added_rows: usize,
    pub has_more: bool,
}

/// Message state of the one open conversation: paginated REST history plus the
/// live socket stream, rendered as one deduplicated ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    conversation_id: Option<ConversationId>,
    peer: String,
    history: Vec<Message>,
    live: Vec<Message>,
    reported_read: HashSet<MessageId>,
    next_page: u32,
    has_more: bool,
    loading_older: bool,
    ui_state: ConversationUiState,
}

impl Default for ConversationView {
    fn default() -> Self {
        Self {
            conversation_id: None,
            peer: String::new(),
            history: Vec::new(),
            live: Vec::new(),
            reported_read: HashSet::new(),
            next_page: 1,
            has_more: true,
            loading_older: false,
            ui_state: ConversationUiState::Empty,
        }
    }
}

impl ConversationView {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn ui_state(&self) -> ConversationUiState {
        self.ui_state.clone()
    }

    pub fn is_open(&self) -> bool {
        self.conversation_id.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Switches to another conversation. Everything known about the previous
    /// one is discarded, never merged.
    pub fn open(&mut self, conversation_id: ConversationId, peer: impl Into<String>) {
        *self = Self {
            conversation_id: Some(conversation_id),
            peer: peer.into(),
            ui_state: ConversationUiState::Loading,
            ..Self::default()
        };
    }

    /// Claims the next history page. `None` while a load is in flight or when
    /// the history is exhausted.
    pub fn begin_page_load(&mut self) -> Option<u32> {
        if !self.is_open() || self.loading_older || !self.has_more {
            return None;
        }

        self.loading_older = true;
        Some(self.next_page)
    }

    pub fn apply_page(&mut self, page: u32, messages: Vec<Message>, has_more: bool) -> PageApplied {
        let rows_before = self.messages().len();
        for message in messages {
            upsert(&mut self.history, message);
        }
        let added_rows = self.messages().len().saturating_sub(rows_before);

        self.next_page = page.saturating_add(1);
        self.has_more = has_more;
        self.loading_older = false;
        self.ui_state = ConversationUiState::Ready;

        PageApplied {
            added_rows,
            has_more,
        }
    }

    pub fn end_of_history(&mut self) {
        self.has_more = false;
        self.loading_older = false;
        self.ui_state = ConversationUiState::Ready;
    }

    pub fn fail_page_load(&mut self) {
        self.loading_older = false;
        if self.history.is_empty() && self.live.is_empty() {
            self.ui_state = ConversationUiState::Error;
        }
    }

    pub fn push_optimistic(&mut self, message: Message) {
        upsert(&mut self.live, message);
    }

    pub fn mark_failed(&mut self, temp_id: &MessageId) -> bool {
        match self.live.iter_mut().find(|message| &message.id == temp_id) {
            Some(message) if message.is_temp => {
                message.status = MessageStatus::Failed;
                true
            }
            _ => false,
        }
    }

    /// Puts a failed temp message back into `sending` and returns it for
    /// re-dispatch under the same temp id.
    pub fn begin_retry(&mut self, temp_id: &MessageId) -> Option<Message> {
        let message = self
            .live
            .iter_mut()
            .find(|message| &message.id == temp_id && message.status == MessageStatus::Failed)?;
        message.status = MessageStatus::Sending;
        Some(message.clone())
    }

    pub fn failed_ids(&self) -> Vec<MessageId> {
        self.live
            .iter()
            .filter(|message| message.is_temp && message.status == MessageStatus::Failed)
            .map(|message| message.id.clone())
            .collect()
    }

    pub fn apply_inbound(&mut self, inbound: InboundMessage) {
        self.live = reconcile(std::mem::take(&mut self.live), inbound);
    }

    /// Merges the batch the server replays on connect. Pending temp entries
    /// stay; their confirmations arrive separately.
    pub fn apply_recent(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.apply_inbound(InboundMessage {
                message,
                temp_id: None,
            });
        }
    }

    pub fn apply_read_receipt(&mut self, message_ids: &[MessageId]) -> usize {
        let ids: HashSet<&MessageId> = message_ids.iter().collect();
        let mut touched = HashSet::new();
        for message in self.history.iter_mut().chain(self.live.iter_mut()) {
            if ids.contains(&message.id) {
                message.status = MessageStatus::Read;
                touched.insert(message.id.clone());
            }
        }

        touched.len()
    }

    pub fn apply_deletion(&mut self, message_id: &MessageId) -> bool {
        let mut found = false;
        for message in self.sources_mut(message_id) {
            message.is_deleted = true;
            found = true;
        }

        found
    }

    pub fn apply_edit(&mut self, message_id: &MessageId, new_text: &str) -> bool {
        let mut found = false;
        for message in self.sources_mut(message_id) {
            message.text = Some(new_text.to_owned());
            found = true;
        }

        found
    }

    pub fn messages(&self) -> Vec<Message> {
        merge_sources(&self.history, &self.live)
    }

    pub fn rendered(&self, profile: &LocalProfile) -> Vec<RenderedMessage> {
        self.messages()
            .into_iter()
            .map(|message| RenderedMessage {
                is_own: profile.is_own(&message),
                message,
            })
            .collect()
    }

    /// Server-confirmed messages from the other participant that are still
    /// unread and were never reported before. Each id is returned once.
    pub fn collect_newly_read(&mut self, profile: &LocalProfile) -> Vec<MessageId> {
        let fresh: Vec<MessageId> = self
            .messages()
            .into_iter()
            .filter(|message| !message.is_temp && message.status.is_unread())
            .filter(|message| !profile.is_own(message))
            .map(|message| message.id)
            .filter(|id| !self.reported_read.contains(id))
            .collect();

        self.reported_read.extend(fresh.iter().cloned());
        fresh
    }

    fn sources_mut<'a>(
        &'a mut self,
        message_id: &'a MessageId,
    ) -> impl Iterator<Item = &'a mut Message> + 'a {
        self.history
            .iter_mut()
            .chain(self.live.iter_mut())
            .filter(move |message| &message.id == message_id)
    }
}

/// Folds one inbound message into the live list. A confirmation carrying the
/// temp id of a local entry replaces that entry in place; a known server id is
/// updated in place; anything else is appended.
pub fn reconcile(mut local: Vec<Message>, inbound: InboundMessage) -> Vec<Message> {
    let InboundMessage {
        mut message,
        temp_id,
    } = inbound;
    message.is_temp = message.id.is_temp();

    let temp_position = temp_id
        .filter(MessageId::is_temp)
        .and_then(|temp_id| local.iter().position(|entry| entry.id == temp_id));

    if let Some(position) = temp_position {
        let server_id = message.id.clone();
        local[position] = message;

        let mut index = 0;
        local.retain(|entry| {
            let keep = index == position || entry.id != server_id;
            index += 1;
            keep
        });
        return local;
    }

    upsert(&mut local, message);
    local
}

/// Deduplicates by id with `live` merged after `history`, drops anything
/// deleted in either source and orders by `created_at`.
pub fn merge_sources(history: &[Message], live: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(history.len() + live.len());
    let mut positions: HashMap<&MessageId, usize> = HashMap::new();
    let mut deleted: HashSet<&MessageId> = HashSet::new();

    for message in history.iter().chain(live) {
        if message.is_deleted {
            deleted.insert(&message.id);
        }
        match positions.get(&message.id) {
            Some(&position) => merged[position] = message.clone(),
            None => {
                positions.insert(&message.id, merged.len());
                merged.push(message.clone());
            }
        }
    }

    merged.retain(|message| !deleted.contains(&message.id));
    merged.sort_by_key(|message| message.created_at);
    merged
}

fn upsert(list: &mut Vec<Message>, message: Message) {
    match list.iter_mut().find(|entry| entry.id == message.id) {
        Some(entry) => *entry = message,
        None => list.push(message),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::domain::{ids::UserId, message::SenderRef};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    fn from(username: &str) -> SenderRef {
        SenderRef {
            id: None,
            username: Some(username.to_owned()),
        }
    }

    fn message(id: &str, text: &str, secs: i64) -> Message {
        Message {
            id: MessageId::parse(id),
            sender: from("bob"),
            text: Some(text.to_owned()),
            image: None,
            created_at: at(secs),
            status: MessageStatus::Sent,
            is_temp: false,
            is_deleted: false,
        }
    }

    fn with_status(mut message: Message, status: MessageStatus) -> Message {
        message.status = status;
        message
    }

    fn deleted(mut message: Message) -> Message {
        message.is_deleted = true;
        message
    }

    fn temp(id: &str, text: &str, secs: i64) -> Message {
        Message::optimistic(
            MessageId::parse(id),
            from("alice"),
            Some(text.to_owned()),
            None,
            at(secs),
        )
    }

    fn alice() -> LocalProfile {
        LocalProfile::new(Some(UserId::new("1")), "alice")
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|message| message.id.as_str()).collect()
    }

    fn opened() -> ConversationView {
        let mut view = ConversationView::default();
        view.open(ConversationId::new("7"), "bob");
        view
    }

    #[test]
    fn confirmation_replaces_temp_entry_in_place() {
        let local = vec![
            message("5", "before", 0),
            temp("temp-X", "hi", 1),
            message("6", "after", 2),
        ];

        let result = reconcile(
            local,
            InboundMessage {
                message: message("42", "hi", 1),
                temp_id: Some(MessageId::parse("temp-X")),
            },
        );

        assert_eq!(ids(&result), vec!["5", "42", "6"]);
        assert!(!result[1].is_temp);
        assert!(result.iter().all(|entry| entry.id.as_str() != "temp-X"));
    }

    #[test]
    fn confirmation_drops_a_copy_that_arrived_earlier() {
        let local = vec![temp("temp-1", "hi", 1), message("42", "hi", 1)];

        let result = reconcile(
            local,
            InboundMessage {
                message: message("42", "hi", 1),
                temp_id: Some(MessageId::parse("temp-1")),
            },
        );

        assert_eq!(ids(&result), vec!["42"]);
    }

    #[test]
    fn unmatched_temp_id_appends_and_known_id_updates_in_place() {
        let local = vec![message("1", "a", 0)];

        let appended = reconcile(
            local,
            InboundMessage {
                message: message("2", "b", 1),
                temp_id: Some(MessageId::parse("temp-missing")),
            },
        );
        let updated = reconcile(
            appended,
            InboundMessage {
                message: with_status(message("1", "a", 0), MessageStatus::Read),
                temp_id: None,
            },
        );

        assert_eq!(ids(&updated), vec!["1", "2"]);
        assert_eq!(updated[0].status, MessageStatus::Read);
    }

    #[test]
    fn merged_sequence_has_unique_ids_in_time_order() {
        let history = vec![message("3", "c", 30), message("1", "a", 10), message("2", "b", 20)];
        let live = vec![message("4", "d", 25), message("2", "b2", 20), message("1", "a", 10)];

        let merged = merge_sources(&history, &live);

        assert_eq!(ids(&merged), vec!["1", "2", "4", "3"]);
        assert_eq!(merged[1].text.as_deref(), Some("b2"));
        assert!(merged
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));
    }

    #[test]
    fn deleted_messages_never_render_from_either_source() {
        let history = vec![deleted(message("1", "a", 0)), message("2", "b", 1)];
        let live = vec![message("1", "a", 0), deleted(message("3", "c", 2))];

        let merged = merge_sources(&history, &live);

        assert_eq!(ids(&merged), vec!["2"]);
    }

    #[test]
    fn overlapping_pages_keep_the_later_status() {
        let mut view = opened();

        view.apply_page(1, vec![message("10", "x", 0)], true);
        view.apply_page(2, vec![with_status(message("10", "x", 0), MessageStatus::Read)], false);

        let messages = view.messages();
        assert_eq!(ids(&messages), vec!["10"]);
        assert_eq!(messages[0].status, MessageStatus::Read);
    }

    #[test]
    fn page_loads_are_claimed_once_and_stop_at_history_end() {
        let mut view = opened();

        assert_eq!(view.begin_page_load(), Some(1));
        assert_eq!(view.begin_page_load(), None);

        view.apply_page(1, vec![message("1", "a", 0)], true);
        assert_eq!(view.begin_page_load(), Some(2));

        view.end_of_history();
        assert!(!view.has_more());
        assert_eq!(view.begin_page_load(), None);
    }

    #[test]
    fn older_page_reports_prepended_rows() {
        let mut view = opened();
        view.apply_page(1, vec![message("5", "e", 50), message("6", "f", 60)], true);

        let applied = view.apply_page(2, vec![message("3", "c", 30), message("4", "d", 40)], true);

        assert_eq!(applied.added_rows, 2);
        assert_eq!(ids(&view.messages()), vec!["3", "4", "5", "6"]);
    }

    #[test]
    fn failed_first_page_on_empty_view_is_an_error_state() {
        let mut view = opened();
        view.begin_page_load();

        view.fail_page_load();

        assert_eq!(view.ui_state(), ConversationUiState::Error);
        assert_eq!(view.begin_page_load(), Some(1));
    }

    #[test]
    fn optimistic_send_then_echo_leaves_one_confirmed_message() {
        let mut view = opened();
        view.push_optimistic(temp("temp-1", "hi", 0));

        let before = view.messages();
        assert_eq!(ids(&before), vec!["temp-1"]);
        assert_eq!(before[0].status, MessageStatus::Sending);

        view.apply_inbound(InboundMessage {
            message: message("42", "hi", 0),
            temp_id: Some(MessageId::parse("temp-1")),
        });

        let after = view.messages();
        assert_eq!(ids(&after), vec!["42"]);
        assert_eq!(after[0].status, MessageStatus::Sent);
        assert!(!after[0].is_temp);
    }

    #[test]
    fn failed_temp_message_can_be_retried() {
        let mut view = opened();
        let temp_id = MessageId::parse("temp-1");
        view.push_optimistic(temp("temp-1", "hi", 0));

        assert!(view.mark_failed(&temp_id));
        assert_eq!(view.failed_ids(), vec![temp_id.clone()]);

        let retried = view.begin_retry(&temp_id).expect("failed message is retryable");
        assert_eq!(retried.status, MessageStatus::Sending);
        assert!(view.failed_ids().is_empty());
        assert!(view.begin_retry(&temp_id).is_none());
    }

    #[test]
    fn recent_messages_merge_without_dropping_pending_temps() {
        let mut view = opened();
        view.push_optimistic(temp("temp-1", "pending", 5));

        view.apply_recent(vec![message("1", "a", 0), message("2", "b", 1)]);

        assert_eq!(ids(&view.messages()), vec!["1", "2", "temp-1"]);
    }

    #[test]
    fn read_receipt_deletion_and_edit_reach_both_sources() {
        let mut view = opened();
        view.apply_page(1, vec![message("1", "a", 0), message("2", "b", 1)], false);
        view.apply_inbound(InboundMessage {
            message: message("1", "a", 0),
            temp_id: None,
        });

        assert_eq!(view.apply_read_receipt(&[MessageId::server(1)]), 1);
        assert!(view.apply_edit(&MessageId::server(1), "edited"));
        assert!(view.apply_deletion(&MessageId::server(2)));
        assert!(!view.apply_deletion(&MessageId::server(99)));

        let messages = view.messages();
        assert_eq!(ids(&messages), vec!["1"]);
        assert_eq!(messages[0].status, MessageStatus::Read);
        assert_eq!(messages[0].text.as_deref(), Some("edited"));
    }

    #[test]
    fn newly_read_ids_are_reported_only_once() {
        let mut view = opened();
        view.apply_page(
            1,
            vec![
                message("1", "a", 0),
                with_status(message("2", "b", 1), MessageStatus::Delivered),
                with_status(message("3", "c", 2), MessageStatus::Read),
            ],
            false,
        );
        view.push_optimistic(temp("temp-1", "mine", 3));

        let first = view.collect_newly_read(&alice());
        view.apply_inbound(InboundMessage {
            message: message("4", "d", 4),
            temp_id: None,
        });
        let second = view.collect_newly_read(&alice());
        let third = view.collect_newly_read(&alice());

        assert_eq!(first, vec![MessageId::server(1), MessageId::server(2)]);
        assert_eq!(second, vec![MessageId::server(4)]);
        assert!(third.is_empty());
    }

    #[test]
    fn own_messages_are_never_reported_as_read() {
        let mut view = opened();
        let mut own = message("1", "mine", 0);
        own.sender = SenderRef {
            id: Some(UserId::new("1")),
            username: None,
        };
        view.apply_page(1, vec![own], false);

        assert!(view.collect_newly_read(&alice()).is_empty());
        assert!(view.rendered(&alice())[0].is_own);
    }

    #[test]
    fn opening_another_conversation_discards_previous_state() {
        let mut view = opened();
        view.apply_page(1, vec![message("1", "a", 0)], false);
        view.collect_newly_read(&alice());

        view.open(ConversationId::new("8"), "carol");

        assert!(view.messages().is_empty());
        assert_eq!(view.peer(), "carol");
        assert_eq!(view.ui_state(), ConversationUiState::Loading);
        assert!(view.has_more());
    }
}
