use super::{
    chat::{ChatListDelta, ChatListUpdate, Conversation},
    ids::ConversationId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatListUiState {
    Loading,
    Ready,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// The list has no entry for this id and cannot build one from a delta.
    UnknownConversation(ConversationId),
}

/// Conversation list ordered most-recently-updated first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListState {
    ui_state: ChatListUiState,
    chats: Vec<Conversation>,
}

impl Default for ChatListState {
    fn default() -> Self {
        Self {
            ui_state: ChatListUiState::Loading,
            chats: Vec::new(),
        }
    }
}

impl ChatListState {
    pub fn ui_state(&self) -> ChatListUiState {
        self.ui_state.clone()
    }

    pub fn chats(&self) -> &[Conversation] {
        &self.chats
    }

    pub fn find(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.chats.iter().find(|chat| &chat.id == conversation_id)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&Conversation> {
        self.chats
            .iter()
            .find(|chat| chat.other_user.username == username)
    }

    pub fn set_ready(&mut self, chats: Vec<Conversation>) {
        if chats.is_empty() {
            self.set_empty();
            return;
        }

        self.ui_state = ChatListUiState::Ready;
        self.chats = chats;
    }

    pub fn set_empty(&mut self) {
        self.ui_state = ChatListUiState::Empty;
        self.chats.clear();
    }

    pub fn set_error(&mut self) {
        self.ui_state = ChatListUiState::Error;
        self.chats.clear();
    }

    /// Applies a snapshot or a batch of deltas. Returns the outcome of every
    /// delta so the caller can schedule a re-fetch for unknown ids.
    pub fn apply_update(&mut self, update: ChatListUpdate) -> Vec<DeltaOutcome> {
        match update {
            ChatListUpdate::Snapshot(chats) => {
                self.set_ready(chats);
                Vec::new()
            }
            ChatListUpdate::Deltas(deltas) => deltas
                .into_iter()
                .map(|delta| self.apply_delta(delta))
                .collect(),
        }
    }

    /// Merges a delta into its entry, bumps the unread count and moves the
    /// entry to the front. Unknown ids are left for a full re-fetch.
    pub fn apply_delta(&mut self, delta: ChatListDelta) -> DeltaOutcome {
        let Some(position) = self
            .chats
            .iter()
            .position(|chat| chat.id == delta.conversation_id)
        else {
            return DeltaOutcome::UnknownConversation(delta.conversation_id);
        };

        let mut chat = self.chats.remove(position);
        if let Some(last_message) = delta.last_message {
            chat.last_message = Some(last_message);
        }
        if let Some(updated_at) = delta.updated_at {
            chat.updated_at = Some(updated_at);
        }
        chat.unread_count = chat.unread_count.saturating_add(delta.unread_increment);
        self.chats.insert(0, chat);

        DeltaOutcome::Applied
    }

    /// Updates presence of every conversation with the given participant.
    /// Returns whether any entry changed.
    pub fn set_presence(&mut self, username: &str, is_online: bool) -> bool {
        let mut changed = false;
        for chat in self
            .chats
            .iter_mut()
            .filter(|chat| chat.other_user.username == username)
        {
            changed |= chat.is_other_online() != is_online;
            chat.other_user.is_online = is_online;
            chat.is_online = Some(is_online);
        }

        changed
    }

    pub fn mark_read(&mut self, conversation_id: &ConversationId) {
        if let Some(chat) = self
            .chats
            .iter_mut()
            .find(|chat| &chat.id == conversation_id)
        {
            chat.unread_count = 0;
        }
    }
}
