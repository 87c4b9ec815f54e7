use std::{
    io::{self, BufRead},
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Result;

use crate::{domain::events::AppEvent, usecases::contracts::AppEventSource};

const STDIN_READ_FAILED: &str = "STDIN_READ_FAILED";

/// Events from the socket runtime and the stdin reader, merged on one
/// channel. A wait that times out yields `Tick`.
pub struct ChannelEventSource {
    events: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(events: Receiver<AppEvent>) -> Self {
        Self { events }
    }
}

impl AppEventSource for ChannelEventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<AppEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(AppEvent::Tick)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Forwards stdin lines as `Input` events; EOF becomes `QuitRequested`.
pub fn spawn_stdin_reader(events: Sender<AppEvent>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("relochat-stdin".to_owned())
        .spawn(move || forward_lines(io::stdin().lock(), &events))
}

fn forward_lines(reader: impl BufRead, events: &Sender<AppEvent>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if events.send(AppEvent::Input(line)).is_err() {
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(code = STDIN_READ_FAILED, error = %error, "stdin read failed");
                break;
            }
        }
    }

    if events.send(AppEvent::QuitRequested).is_err() {
        tracing::debug!("event loop already gone at stdin EOF");
    }
}

#[cfg(test)]
pub struct MockEventSource {
    queue: std::collections::VecDeque<AppEvent>,
    pub timeouts: Vec<Duration>,
}

#[cfg(test)]
impl MockEventSource {
    pub fn from(events: Vec<AppEvent>) -> Self {
        Self {
            queue: events.into(),
            timeouts: Vec::new(),
        }
    }
}

#[cfg(test)]
impl AppEventSource for MockEventSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<AppEvent>> {
        self.timeouts.push(timeout);
        Ok(self.queue.pop_front())
    }
}
