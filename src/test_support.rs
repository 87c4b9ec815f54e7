use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::{
    domain::events::{ChannelKind, SocketId, SocketSignal, TransportEvent},
    realtime::connection::{ChannelError, SocketConnector, SocketHandle},
    usecases::backend_jobs::{run_job, BackendJob, JobBackend, JobResult, JobRunner},
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().expect("env lock should not be poisoned")
}

pub fn opened(socket: SocketId) -> TransportEvent {
    TransportEvent {
        socket,
        signal: SocketSignal::Opened,
    }
}

pub fn text(socket: SocketId, body: &str) -> TransportEvent {
    TransportEvent {
        socket,
        signal: SocketSignal::Text(body.to_owned()),
    }
}

#[derive(Debug, Default)]
struct SocketLog {
    opened: Vec<(SocketId, String)>,
    sent: Vec<(SocketId, String)>,
    closed: Vec<(SocketId, u16, String)>,
}

/// Connector that records every socket it opens instead of touching the
/// network. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    log: Arc<Mutex<SocketLog>>,
    fail_with: Option<ChannelError>,
}

impl FakeConnector {
    pub fn failing(error: ChannelError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    fn log(&self) -> MutexGuard<'_, SocketLog> {
        self.log.lock().expect("socket log lock")
    }

    pub fn opened_sockets(&self, kind: ChannelKind) -> Vec<SocketId> {
        self.log()
            .opened
            .iter()
            .map(|(socket, _)| *socket)
            .filter(|socket| socket.kind == kind)
            .collect()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.log().opened.iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn last_opened(&self, kind: ChannelKind) -> SocketId {
        *self
            .opened_sockets(kind)
            .last()
            .expect("a socket of this kind should have been opened")
    }

    pub fn closed_sockets(&self) -> Vec<SocketId> {
        self.log().closed.iter().map(|(socket, _, _)| *socket).collect()
    }

    pub fn close_frames(&self) -> Vec<(SocketId, u16, String)> {
        self.log().closed.clone()
    }

    pub fn live_sockets(&self, kind: ChannelKind) -> Vec<SocketId> {
        let closed = self.closed_sockets();
        self.opened_sockets(kind)
            .into_iter()
            .filter(|socket| !closed.contains(socket))
            .collect()
    }

    pub fn sent_json(&self, kind: ChannelKind) -> Vec<Value> {
        self.log()
            .sent
            .iter()
            .filter(|(socket, _)| socket.kind == kind)
            .map(|(_, text)| serde_json::from_str(text).expect("sent frames are JSON"))
            .collect()
    }
}

impl SocketConnector for FakeConnector {
    fn open(&mut self, socket: SocketId, url: &str) -> Result<Box<dyn SocketHandle>, ChannelError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        self.log().opened.push((socket, url.to_owned()));
        Ok(Box::new(FakeSocket {
            socket,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSocket {
    socket: SocketId,
    log: Arc<Mutex<SocketLog>>,
}

impl SocketHandle for FakeSocket {
    fn send_text(&mut self, text: String) -> bool {
        self.log
            .lock()
            .expect("socket log lock")
            .sent
            .push((self.socket, text));
        true
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.log
            .lock()
            .expect("socket log lock")
            .closed
            .push((self.socket, code, reason.to_owned()));
    }
}

/// Job runner that finishes every job the moment it is submitted.
pub struct InlineJobs<B> {
    pub backend: B,
    finished: Vec<JobResult>,
}

impl<B> InlineJobs<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            finished: Vec::new(),
        }
    }
}

impl<B: JobBackend> JobRunner for InlineJobs<B> {
    fn submit(&mut self, job: BackendJob) {
        self.finished.push(run_job(&self.backend, job));
    }

    fn take_finished(&mut self) -> Vec<JobResult> {
        std::mem::take(&mut self.finished)
    }
}
