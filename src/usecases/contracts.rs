use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    domain::events::AppEvent,
    realtime::connection::SocketConnector,
    usecases::{
        backend_jobs::JobRunner,
        chat_session::{ChatSession, Notice},
    },
};

pub trait AppEventSource {
    /// Waits at most `timeout`. `Ok(None)` once the source is exhausted.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<AppEvent>>;
}

pub trait ChatOrchestrator {
    fn is_running(&self) -> bool;
    fn next_deadline(&self) -> Option<Instant>;
    fn handle_event(&mut self, event: AppEvent, now: Instant, wall_clock: DateTime<Utc>)
        -> Vec<Notice>;
}

impl<C: SocketConnector, J: JobRunner> ChatOrchestrator for ChatSession<C, J> {
    fn is_running(&self) -> bool {
        ChatSession::is_running(self)
    }

    fn next_deadline(&self) -> Option<Instant> {
        ChatSession::next_deadline(self)
    }

    fn handle_event(
        &mut self,
        event: AppEvent,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> Vec<Notice> {
        ChatSession::handle_event(self, event, now, wall_clock)
    }
}
