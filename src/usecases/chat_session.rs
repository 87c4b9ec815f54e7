//! Interactive chat workflow.
//!
//! `ChatSession` owns the connection manager, the three channel sessions, the
//! chat list and the open conversation. The terminal loop feeds it
//! `AppEvent`s and prints the `Notice`s it returns. Socket writes are queued
//! and REST calls go to a `JobRunner`, so nothing in here blocks.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use chrono::{DateTime, Utc};

use crate::{
    domain::{
        chat::{ChatListUpdate, Conversation},
        chat_list_state::{ChatListState, ChatListUiState, DeltaOutcome},
        conversation_view::{ConversationUiState, ConversationView, RenderedMessage},
        events::{AppEvent, ChannelKind, ConnectionState},
        ids::{ConversationId, MessageId},
        message::{InboundMessage, TempIdGenerator},
        profile::LocalProfile,
    },
    infra::config::ChatConfig,
    realtime::{
        chat_list::ChatListSession,
        connection::{ChannelEvent, ConnectionManager, SessionEvent, SocketConnector},
        direct_chat::{DeferReason, DirectChatSession, OpenOutcome},
        presence::PresenceSession,
        protocol::{image_data_url, ChatFrame, UserStatus},
    },
    usecases::{
        backend_jobs::{BackendJob, JobResult, JobRunner},
        list_chats::{list_chats, ChatListSource, ListChatsError, RefreshThrottle},
        load_messages::{
            apply_fetched_page, begin_page_request, LoadMessagesError, LoadOlderOutcome,
            MessagePage, MessagesSourceError, PageRequest,
        },
        mark_read::{report_newly_read, MarkReadError},
        send_message::{
            retry_failed, send_message, ChatSocket, SendMessageCommand, SendMessageError,
            SendOutcome,
        },
        start_conversation::{open_conversation, ConversationStarter, StartConversationError},
    },
};

const CHAT_LIST_FETCH_FAILED: &str = "CHAT_LIST_FETCH_FAILED";
const CHAT_HISTORY_LOAD_FAILED: &str = "CHAT_HISTORY_LOAD_FAILED";
const CHAT_MARK_READ_FAILED: &str = "CHAT_MARK_READ_FAILED";
const CHAT_IMAGE_READ_FAILED: &str = "CHAT_IMAGE_READ_FAILED";

/// Something the terminal should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connection {
        channel: ChannelKind,
        state: ConnectionState,
        detail: Option<String>,
    },
    ConversationOpened {
        peer: String,
        online: bool,
    },
    /// Rows added by a history page, oldest first.
    History {
        messages: Vec<RenderedMessage>,
        has_more: bool,
    },
    HistoryEnd,
    Message(RenderedMessage),
    /// The server confirmed one of our sends under its real id.
    Confirmed {
        temp_id: MessageId,
        message_id: MessageId,
    },
    PeerTyping(bool),
    ReadByPeer(usize),
    Deleted(MessageId),
    Edited {
        message_id: MessageId,
        text: String,
    },
    ChatList(Vec<Conversation>),
    ChatUpdated(Conversation),
    Presence {
        username: String,
        online: bool,
    },
    ServerError(String),
    Info(String),
    Error(String),
}

/// One line typed into the interactive chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Send(String),
    Image {
        path: PathBuf,
        caption: Option<String>,
    },
    More,
    Retry,
    Delete {
        message_id: MessageId,
        for_everyone: bool,
    },
    Edit {
        message_id: MessageId,
        text: String,
    },
    Refresh,
    Quit,
    Invalid(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let Some(command) = line.trim().strip_prefix('/') else {
            return Self::Send(line.to_owned());
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));

        match name {
            "more" => Self::More,
            "retry" => Self::Retry,
            "refresh" => Self::Refresh,
            "quit" | "exit" => Self::Quit,
            "delete" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                match parts.as_slice() {
                    [id] => Self::Delete {
                        message_id: MessageId::parse(id),
                        for_everyone: false,
                    },
                    [id, "everyone"] => Self::Delete {
                        message_id: MessageId::parse(id),
                        for_everyone: true,
                    },
                    _ => Self::Invalid("usage: /delete <id> [everyone]".to_owned()),
                }
            }
            "edit" => match rest.split_once(char::is_whitespace) {
                Some((id, text)) if !text.trim().is_empty() => Self::Edit {
                    message_id: MessageId::parse(id),
                    text: text.trim().to_owned(),
                },
                _ => Self::Invalid("usage: /edit <id> <text>".to_owned()),
            },
            "image" if !rest.is_empty() => {
                let (path, caption) = match rest.split_once(char::is_whitespace) {
                    Some((path, caption)) => (path, Some(caption.trim().to_owned())),
                    None => (rest, None),
                };
                Self::Image {
                    path: PathBuf::from(path),
                    caption,
                }
            }
            "image" => Self::Invalid("usage: /image <path> [caption]".to_owned()),
            other => Self::Invalid(format!("unknown command: /{other}")),
        }
    }
}

pub struct ChatSession<C, J> {
    conn: ConnectionManager<C>,
    jobs: J,
    access_token: String,
    profile: Option<LocalProfile>,
    direct: DirectChatSession,
    chat_list: ChatListSession,
    presence: PresenceSession,
    chats: ChatListState,
    view: ConversationView,
    temp_ids: TempIdGenerator,
    refresh: RefreshThrottle,
    running: bool,
}

impl<C: SocketConnector, J: JobRunner> ChatSession<C, J> {
    pub fn new(
        conn: ConnectionManager<C>,
        jobs: J,
        access_token: impl Into<String>,
        profile: Option<LocalProfile>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            conn,
            jobs,
            access_token: access_token.into(),
            profile,
            direct: DirectChatSession::new(config.typing_idle()),
            chat_list: ChatListSession,
            presence: PresenceSession,
            chats: ChatListState::default(),
            view: ConversationView::default(),
            temp_ids: TempIdGenerator::default(),
            refresh: RefreshThrottle::new(config.refresh_debounce()),
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(test)]
    pub fn chats(&self) -> &ChatListState {
        &self.chats
    }

    #[cfg(test)]
    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    /// Nearest instant at which a `Tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.direct.typing_deadline(), self.refresh.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Requests the chat list and opens the chat-list and status channels.
    pub fn start_watch(&mut self, now: Instant) -> Vec<Notice> {
        let mut notices = Vec::new();
        if self.refresh.request(now) {
            self.jobs.submit(BackendJob::ListChats);
        }
        self.chat_list.open(&mut self.conn, Some(self.access_token.as_str()));
        self.presence.open(&mut self.conn, Some(self.access_token.as_str()));
        self.settle(now, &mut notices);
        notices
    }

    /// Watch mode plus the direct chat in `conversation`: requests page 1 and
    /// opens the chat channel.
    pub fn start_chat(&mut self, conversation: Conversation, now: Instant) -> Vec<Notice> {
        let mut notices = self.start_watch(now);
        let profile = match require_identity(self.profile.as_ref()) {
            Ok(profile) => profile.clone(),
            Err(message) => {
                notices.push(Notice::Error(message));
                self.shutdown();
                return notices;
            }
        };

        let peer = conversation.other_user.username.clone();
        tracing::info!(
            conversation_id = %conversation.id,
            peer = %peer,
            "opening conversation"
        );
        notices.push(Notice::ConversationOpened {
            peer: conversation.other_user.display_name(),
            online: conversation.is_other_online(),
        });
        self.view.open(conversation.id.clone(), peer.clone());
        self.mark_open_read();
        self.load_older();

        let outcome = self.direct.open(
            &mut self.conn,
            Some(peer.as_str()),
            Some(self.access_token.as_str()),
            Some(&profile),
        );
        if let OpenOutcome::Deferred(reason) = outcome {
            notices.push(Notice::Info(describe_defer(reason).to_owned()));
        }
        self.settle(now, &mut notices);
        notices
    }

    pub fn handle_event(
        &mut self,
        event: AppEvent,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> Vec<Notice> {
        let mut notices = Vec::new();
        match event {
            AppEvent::Tick => self.on_tick(now),
            AppEvent::QuitRequested => self.shutdown(),
            AppEvent::Input(line) => self.on_input(&line, now, wall_clock, &mut notices),
            AppEvent::Transport(event) => {
                if let Some(event) = self.conn.handle(event) {
                    self.route(event, now, &mut notices);
                }
            }
            AppEvent::BackendReady => {}
        }
        self.settle(now, &mut notices);
        notices
    }

    /// Closes every channel. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.direct.peer().is_some() {
            self.direct.close(&mut self.conn);
        }
        self.chat_list.close(&mut self.conn);
        self.presence.close(&mut self.conn);
        self.running = false;
    }

    fn on_tick(&mut self, now: Instant) {
        self.direct.poll_typing(&mut self.conn, now);
        if self.refresh.poll(now) {
            self.jobs.submit(BackendJob::ListChats);
        }
    }

    fn on_input(
        &mut self,
        line: &str,
        now: Instant,
        wall_clock: DateTime<Utc>,
        notices: &mut Vec<Notice>,
    ) {
        match ChatInput::parse(line) {
            ChatInput::Send(text) => {
                if !text.trim().is_empty() {
                    self.direct.note_input(&mut self.conn, now);
                }
                self.send(SendMessageCommand::text(text), wall_clock, notices);
            }
            ChatInput::Image { path, caption } => match read_image(&path) {
                Ok(data_url) => {
                    self.direct.note_input(&mut self.conn, now);
                    let command = SendMessageCommand {
                        text: caption.unwrap_or_default(),
                        image: Some(data_url),
                    };
                    self.send(command, wall_clock, notices);
                }
                Err(error) => {
                    tracing::warn!(
                        code = CHAT_IMAGE_READ_FAILED,
                        path = %path.display(),
                        error = %error,
                        "image could not be read"
                    );
                    notices.push(Notice::Error(format!(
                        "cannot read {}: {error}",
                        path.display()
                    )));
                }
            },
            ChatInput::More => {
                if !self.view.is_open() {
                    notices.push(Notice::Error("no conversation is open".to_owned()));
                } else if !self.view.has_more() {
                    notices.push(Notice::HistoryEnd);
                } else {
                    self.load_older();
                }
            }
            ChatInput::Retry => {
                if !self.direct.is_connected(&self.conn) {
                    notices.push(Notice::Error(
                        "chat is not connected; failed messages stay failed".to_owned(),
                    ));
                    return;
                }
                let mut socket = ChatSocket::new(&self.direct, &mut self.conn);
                let report = retry_failed(&mut socket, &mut self.view);
                notices.push(Notice::Info(format!(
                    "retried {} message(s), {} still failed",
                    report.dispatched, report.still_failed
                )));
            }
            ChatInput::Delete {
                message_id,
                for_everyone,
            } => {
                if self.reject_unconfirmed(&message_id, notices) {
                    return;
                }
                if !self
                    .direct
                    .delete_message(&mut self.conn, &message_id, for_everyone)
                {
                    notices.push(Notice::Error("chat is not connected".to_owned()));
                }
            }
            ChatInput::Edit { message_id, text } => {
                if self.reject_unconfirmed(&message_id, notices) {
                    return;
                }
                if !self.direct.edit_message(&mut self.conn, &message_id, &text) {
                    notices.push(Notice::Error("chat is not connected".to_owned()));
                }
            }
            ChatInput::Refresh => {
                if !self.chat_list.request_refresh(&mut self.conn, wall_clock) {
                    notices.push(Notice::Error("chat list is not connected".to_owned()));
                }
            }
            ChatInput::Quit => self.shutdown(),
            ChatInput::Invalid(usage) => notices.push(Notice::Error(usage)),
        }
    }

    fn send(
        &mut self,
        command: SendMessageCommand,
        wall_clock: DateTime<Utc>,
        notices: &mut Vec<Notice>,
    ) {
        let Some(profile) = self.profile.as_ref() else {
            notices.push(Notice::Error("no conversation is open".to_owned()));
            return;
        };

        let mut socket = ChatSocket::new(&self.direct, &mut self.conn);
        let outcome = send_message(
            &mut socket,
            &mut self.view,
            profile,
            &mut self.temp_ids,
            command,
            wall_clock,
        );
        match outcome {
            Ok(SendOutcome::Dispatched(temp_id) | SendOutcome::Failed(temp_id)) => {
                if let Some(rendered) = self.rendered(&temp_id) {
                    notices.push(Notice::Message(rendered));
                }
            }
            Err(SendMessageError::EmptyMessage) => {}
            Err(SendMessageError::ConversationNotOpen) => {
                notices.push(Notice::Error("no conversation is open".to_owned()));
            }
        }
    }

    fn reject_unconfirmed(&self, message_id: &MessageId, notices: &mut Vec<Notice>) -> bool {
        if message_id.is_temp() {
            notices.push(Notice::Error(format!(
                "message {message_id} is not confirmed by the server yet"
            )));
        }
        message_id.is_temp()
    }

    /// Routes queued channel events and finished REST jobs until neither is
    /// left. Applying either can produce more of both.
    fn settle(&mut self, now: Instant, notices: &mut Vec<Notice>) {
        loop {
            for event in self.conn.take_pending() {
                self.route(event, now, notices);
            }

            let finished = self.jobs.take_finished();
            if finished.is_empty() {
                break;
            }
            for result in finished {
                self.on_job_result(result, notices);
            }
        }
    }

    fn route(&mut self, event: ChannelEvent, now: Instant, notices: &mut Vec<Notice>) {
        match event.kind {
            ChannelKind::Chat => {
                let was_typing = self.direct.is_peer_typing();
                if let Some(event) = self.direct.handle(event) {
                    self.on_chat_event(event, was_typing, notices);
                }
            }
            ChannelKind::ChatList => {
                if let Some(event) = self.chat_list.handle(event) {
                    self.on_chat_list_event(event, now, notices);
                }
            }
            ChannelKind::Status => {
                if let Some(event) = self.presence.handle(event) {
                    self.on_presence_event(event, notices);
                }
            }
        }
    }

    fn on_chat_event(
        &mut self,
        event: SessionEvent<ChatFrame>,
        was_typing: bool,
        notices: &mut Vec<Notice>,
    ) {
        let frame = match event {
            SessionEvent::Payload(frame) => frame,
            lifecycle => {
                let connected = matches!(lifecycle, SessionEvent::Connected);
                notices.extend(connection_notice(ChannelKind::Chat, lifecycle));
                if was_typing && !self.direct.is_peer_typing() {
                    notices.push(Notice::PeerTyping(false));
                }
                if connected {
                    self.report_read();
                }
                return;
            }
        };

        match frame {
            ChatFrame::Message(inbound) => {
                notices.push(self.apply_inbound(inbound));
                self.report_read();
            }
            ChatFrame::RecentMessages(messages) => {
                let ids: Vec<MessageId> = messages.iter().map(|message| message.id.clone()).collect();
                self.view.apply_recent(messages);
                notices.extend(ids.iter().filter_map(|id| self.rendered(id)).map(Notice::Message));
                self.report_read();
            }
            ChatFrame::MessagesLoaded { messages, has_more } => {
                let known = self.known_ids();
                self.view.apply_recent(messages);
                let added = self.rendered_except(&known);
                if !added.is_empty() {
                    notices.push(Notice::History {
                        messages: added,
                        has_more,
                    });
                }
                self.report_read();
            }
            ChatFrame::ParticipantPresence { online, .. } => {
                if self.view.is_open() {
                    let peer = self.view.peer().to_owned();
                    self.chats.set_presence(&peer, online);
                    notices.push(Notice::Presence {
                        username: peer,
                        online,
                    });
                }
            }
            ChatFrame::Typing { .. } => {
                let typing = self.direct.is_peer_typing();
                if typing != was_typing {
                    notices.push(Notice::PeerTyping(typing));
                }
            }
            ChatFrame::ReadReceipt { message_ids, .. } => {
                let marked = self.view.apply_read_receipt(&message_ids);
                if marked > 0 {
                    notices.push(Notice::ReadByPeer(marked));
                }
            }
            ChatFrame::MessageDeleted { message_id, .. } => {
                if self.view.apply_deletion(&message_id) {
                    notices.push(Notice::Deleted(message_id));
                }
            }
            ChatFrame::MessageUpdated {
                message_id,
                new_text,
            } => {
                if self.view.apply_edit(&message_id, &new_text) {
                    notices.push(Notice::Edited {
                        message_id,
                        text: new_text,
                    });
                }
            }
            ChatFrame::ServerError(message) => notices.push(Notice::ServerError(message)),
        }
    }

    fn apply_inbound(&mut self, inbound: InboundMessage) -> Notice {
        let message_id = inbound.message.id.clone();
        let confirmed = inbound
            .temp_id
            .clone()
            .filter(|temp_id| self.view.messages().iter().any(|message| &message.id == temp_id));
        self.view.apply_inbound(inbound);

        match (confirmed, self.rendered(&message_id)) {
            (Some(temp_id), _) => Notice::Confirmed {
                temp_id,
                message_id,
            },
            (None, Some(rendered)) => Notice::Message(rendered),
            (None, None) => Notice::Deleted(message_id),
        }
    }

    fn on_chat_list_event(
        &mut self,
        event: SessionEvent<ChatListUpdate>,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) {
        let update = match event {
            SessionEvent::Payload(update) => update,
            lifecycle => {
                notices.extend(connection_notice(ChannelKind::ChatList, lifecycle));
                return;
            }
        };

        let ids: Vec<ConversationId> = match &update {
            ChatListUpdate::Snapshot(_) => Vec::new(),
            ChatListUpdate::Deltas(deltas) => deltas
                .iter()
                .map(|delta| delta.conversation_id.clone())
                .collect(),
        };
        let is_snapshot = matches!(update, ChatListUpdate::Snapshot(_));
        let outcomes = self.chats.apply_update(update);
        // The open conversation is read as it arrives; server counters lag.
        self.mark_open_read();
        if is_snapshot {
            notices.push(Notice::ChatList(self.chats.chats().to_vec()));
            return;
        }

        let mut needs_refetch = false;
        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                DeltaOutcome::Applied => {
                    if let Some(chat) = self.chats.find(id) {
                        notices.push(Notice::ChatUpdated(chat.clone()));
                    }
                }
                DeltaOutcome::UnknownConversation(unknown) => {
                    tracing::debug!(conversation_id = %unknown, "delta for an unknown conversation");
                    needs_refetch = true;
                }
            }
        }

        if needs_refetch && self.refresh.request(now) {
            self.jobs.submit(BackendJob::ListChats);
        }
    }

    fn on_presence_event(&mut self, event: SessionEvent<UserStatus>, notices: &mut Vec<Notice>) {
        let status = match event {
            SessionEvent::Payload(status) => status,
            lifecycle => {
                notices.extend(connection_notice(ChannelKind::Status, lifecycle));
                return;
            }
        };

        let changed = self.chats.set_presence(&status.username, status.is_online);
        let is_peer = self.view.is_open() && self.view.peer() == status.username;
        if changed || is_peer {
            notices.push(Notice::Presence {
                username: status.username,
                online: status.is_online,
            });
        }
    }

    fn on_job_result(&mut self, result: JobResult, notices: &mut Vec<Notice>) {
        match result {
            JobResult::ChatList(Ok(chats)) => {
                self.chats.set_ready(chats);
                self.mark_open_read();
                notices.push(Notice::ChatList(self.chats.chats().to_vec()));
            }
            JobResult::ChatList(Err(error)) => self.on_chat_list_failed(&error, notices),
            JobResult::Page { request, fetched } => self.on_page(&request, fetched, notices),
            JobResult::MarkRead {
                message_ids,
                result,
            } => self.on_marked_read(&message_ids, result),
        }
    }

    fn on_chat_list_failed(&mut self, error: &ListChatsError, notices: &mut Vec<Notice>) {
        tracing::warn!(
            code = CHAT_LIST_FETCH_FAILED,
            error = ?error,
            "chat list fetch failed"
        );
        let message = describe_list_error(error);
        if self.chats.ui_state() == ChatListUiState::Ready {
            notices.push(Notice::Error(format!("{message}; showing the last known list")));
        } else {
            self.chats.set_error();
            notices.push(Notice::Error(message.to_owned()));
        }
    }

    fn on_page(
        &mut self,
        request: &PageRequest,
        fetched: Result<MessagePage, MessagesSourceError>,
        notices: &mut Vec<Notice>,
    ) {
        let known = self.known_ids();
        match apply_fetched_page(&mut self.view, request, fetched) {
            Ok(LoadOlderOutcome::Loaded(applied)) => {
                notices.push(Notice::History {
                    messages: self.rendered_except(&known),
                    has_more: applied.has_more,
                });
                self.report_read();
            }
            Ok(LoadOlderOutcome::EndOfHistory) => notices.push(Notice::HistoryEnd),
            Ok(LoadOlderOutcome::Stale) => {
                tracing::debug!(
                    conversation_id = %request.conversation_id,
                    page = request.page,
                    "dropping a page of a conversation that is no longer open"
                );
            }
            Err(error) => {
                tracing::warn!(
                    code = CHAT_HISTORY_LOAD_FAILED,
                    error = ?error,
                    page = request.page,
                    "message history load failed"
                );
                let message = describe_load_error(&error);
                if self.view.ui_state() == ConversationUiState::Error {
                    notices.push(Notice::Error(format!("conversation could not be loaded: {message}")));
                } else {
                    notices.push(Notice::Error(message.to_owned()));
                }
            }
        }
    }

    fn on_marked_read(&self, message_ids: &[MessageId], result: Result<(), MarkReadError>) {
        match result {
            Ok(()) => tracing::debug!(count = message_ids.len(), "messages marked as read"),
            Err(error) => {
                tracing::warn!(
                    code = CHAT_MARK_READ_FAILED,
                    count = message_ids.len(),
                    error = ?error,
                    "mark as read failed"
                );
            }
        }
    }

    fn load_older(&mut self) {
        if let Some(request) = begin_page_request(&mut self.view) {
            tracing::debug!(
                conversation_id = %request.conversation_id,
                page = request.page,
                "requesting history page"
            );
            self.jobs.submit(BackendJob::LoadPage(request));
        }
    }

    /// Sends the socket receipt at once and queues the REST call.
    fn report_read(&mut self) {
        let Some(profile) = self.profile.as_ref() else {
            return;
        };

        let mut socket = ChatSocket::new(&self.direct, &mut self.conn);
        let report = report_newly_read(&mut socket, &mut self.view, profile);
        if report.message_ids.is_empty() {
            return;
        }

        tracing::debug!(
            count = report.message_ids.len(),
            receipt_sent = report.receipt_sent,
            "reporting messages as read"
        );
        self.mark_open_read();
        self.jobs.submit(BackendJob::MarkRead(report.message_ids));
    }

    fn mark_open_read(&mut self) {
        if let Some(conversation_id) = self.view.conversation_id() {
            self.chats.mark_read(conversation_id);
        }
    }

    fn known_ids(&self) -> HashSet<MessageId> {
        self.view
            .messages()
            .into_iter()
            .map(|message| message.id)
            .collect()
    }

    /// Rendered rows whose ids are not in `known`, in display order.
    fn rendered_except(&self, known: &HashSet<MessageId>) -> Vec<RenderedMessage> {
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };
        self.view
            .rendered(profile)
            .into_iter()
            .filter(|rendered| !known.contains(&rendered.message.id))
            .collect()
    }

    fn rendered(&self, message_id: &MessageId) -> Option<RenderedMessage> {
        let profile = self.profile.as_ref()?;
        self.view
            .rendered(profile)
            .into_iter()
            .find(|rendered| &rendered.message.id == message_id)
    }
}

/// Finds the conversation with `username`, or creates it, before the event
/// loop starts. The chat list is consulted first to save a round trip.
pub fn resolve_conversation<B>(
    backend: &B,
    profile: Option<&LocalProfile>,
    username: &str,
) -> Result<Conversation, String>
where
    B: ChatListSource + ConversationStarter,
{
    let profile = require_identity(profile)?;
    let mut chats = ChatListState::default();
    match list_chats(backend) {
        Ok(list) => chats.set_ready(list),
        Err(error) => {
            tracing::warn!(
                code = CHAT_LIST_FETCH_FAILED,
                error = ?error,
                "chat list fetch failed; asking the server for the conversation"
            );
        }
    }

    open_conversation(backend, &chats, profile, username)
        .map_err(|error| describe_start_error(&error, username))
}

/// The direct chat tells own messages apart by user id.
fn require_identity(profile: Option<&LocalProfile>) -> Result<&LocalProfile, String> {
    match profile {
        None => Err(
            "stored session has no username; run `relochat login --username <name>`".to_owned(),
        ),
        Some(profile) if profile.id.is_none() => Err(
            "stored session has no user id; run `relochat login --username <name> --user-id <id>`"
                .to_owned(),
        ),
        Some(profile) => Ok(profile),
    }
}

fn connection_notice<T>(channel: ChannelKind, event: SessionEvent<T>) -> Option<Notice> {
    let (state, detail) = match event {
        SessionEvent::Connected => (ConnectionState::Connected, None),
        SessionEvent::Disconnected(close) => (
            ConnectionState::Disconnected,
            close.map(|close| format!("{} {}", close.code, close.reason).trim().to_owned()),
        ),
        SessionEvent::Failed(error) => (ConnectionState::Error, Some(error.to_string())),
        SessionEvent::Payload(_) => return None,
    };

    Some(Notice::Connection {
        channel,
        state,
        detail,
    })
}

fn read_image(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(image_data_url(image_mime(path), &bytes))
}

fn image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn describe_defer(reason: DeferReason) -> &'static str {
    match reason {
        DeferReason::MissingPeer => "chat not opened: the other participant is unknown",
        DeferReason::MissingProfile => "chat not opened: the local profile is not known yet",
    }
}

pub(crate) fn describe_list_error(error: &ListChatsError) -> &'static str {
    match error {
        ListChatsError::Unauthorized => "access token was rejected; run `relochat login`",
        ListChatsError::TemporarilyUnavailable => "chat list is temporarily unavailable",
        ListChatsError::DataContractViolation => "server returned an unexpected chat list",
    }
}

fn describe_load_error(error: &LoadMessagesError) -> &'static str {
    match error {
        LoadMessagesError::Unauthorized => "access token was rejected; run `relochat login`",
        LoadMessagesError::TemporarilyUnavailable => {
            "message history is temporarily unavailable; try /more"
        }
        LoadMessagesError::DataContractViolation => "server returned unexpected messages",
        LoadMessagesError::ConversationNotFound => "conversation no longer exists",
    }
}

fn describe_start_error(error: &StartConversationError, username: &str) -> String {
    match error {
        StartConversationError::EmptyUsername => "a username is required".to_owned(),
        StartConversationError::CannotChatWithSelf => "you cannot chat with yourself".to_owned(),
        StartConversationError::Unauthorized => {
            "access token was rejected; run `relochat login`".to_owned()
        }
        StartConversationError::TemporarilyUnavailable => {
            "server is temporarily unavailable".to_owned()
        }
        StartConversationError::DataContractViolation => {
            "server returned an unexpected conversation".to_owned()
        }
        StartConversationError::UserNotFound => format!("user {username} was not found"),
    }
}
