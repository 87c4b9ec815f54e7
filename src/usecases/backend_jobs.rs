//! REST calls made on behalf of the interactive session.
//!
//! The HTTP client blocks, so the event loop never calls it directly. It
//! submits a `BackendJob`, keeps handling input and socket traffic, and picks
//! the `JobResult` up once the worker wakes it with `AppEvent::BackendReady`.

use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use crate::{
    domain::{chat::Conversation, events::AppEvent, ids::MessageId},
    infra::error::AppError,
    usecases::{
        list_chats::{list_chats, ChatListSource, ListChatsError},
        load_messages::{MessagePage, MessagesSource, MessagesSourceError, PageRequest},
        mark_read::{mark_read_remote, MarkReadError, ReadMarkerSource},
    },
};

const BACKEND_WORKER_SHUTDOWN_FAILED: &str = "BACKEND_WORKER_SHUTDOWN_FAILED";

/// REST collaborators the background jobs need.
pub trait JobBackend: ChatListSource + MessagesSource + ReadMarkerSource {}

impl<T> JobBackend for T where T: ChatListSource + MessagesSource + ReadMarkerSource {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendJob {
    ListChats,
    LoadPage(PageRequest),
    MarkRead(Vec<MessageId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    ChatList(Result<Vec<Conversation>, ListChatsError>),
    Page {
        request: PageRequest,
        fetched: Result<MessagePage, MessagesSourceError>,
    },
    MarkRead {
        message_ids: Vec<MessageId>,
        result: Result<(), MarkReadError>,
    },
}

/// Where the session sends REST work.
pub trait JobRunner {
    fn submit(&mut self, job: BackendJob);

    /// Results finished since the last call, in completion order.
    fn take_finished(&mut self) -> Vec<JobResult>;
}

pub fn run_job(backend: &dyn JobBackend, job: BackendJob) -> JobResult {
    match job {
        BackendJob::ListChats => JobResult::ChatList(list_chats(&backend)),
        BackendJob::LoadPage(request) => {
            let fetched = backend.fetch_page(&request.conversation_id, request.page);
            JobResult::Page { request, fetched }
        }
        BackendJob::MarkRead(message_ids) => {
            let result = mark_read_remote(&backend, &message_ids);
            JobResult::MarkRead {
                message_ids,
                result,
            }
        }
    }
}

/// Runs jobs one at a time on a dedicated thread.
#[derive(Debug)]
pub struct BackendWorker {
    jobs: Option<Sender<BackendJob>>,
    finished: Receiver<JobResult>,
    worker: Option<JoinHandle<()>>,
}

impl BackendWorker {
    pub fn start<B>(backend: B, wake: Sender<AppEvent>) -> Result<Self, AppError>
    where
        B: JobBackend + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        let (finished_tx, finished_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("relochat-rest".to_owned())
            .spawn(move || run_worker(&backend, &jobs_rx, &finished_tx, &wake))
            .map_err(AppError::WorkerSpawn)?;

        Ok(Self {
            jobs: Some(jobs_tx),
            finished: finished_rx,
            worker: Some(worker),
        })
    }
}

impl JobRunner for BackendWorker {
    fn submit(&mut self, job: BackendJob) {
        let sent = self
            .jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(job).is_ok());
        if !sent {
            tracing::warn!("REST worker is gone; job dropped");
        }
    }

    fn take_finished(&mut self) -> Vec<JobResult> {
        self.finished.try_iter().collect()
    }
}

impl Drop for BackendWorker {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish its current job and exit.
        self.jobs.take();

        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                tracing::warn!(
                    code = BACKEND_WORKER_SHUTDOWN_FAILED,
                    error = ?error,
                    "REST worker panicked on shutdown"
                );
            }
        }
    }
}

fn run_worker(
    backend: &dyn JobBackend,
    jobs: &Receiver<BackendJob>,
    finished: &Sender<JobResult>,
    wake: &Sender<AppEvent>,
) {
    for job in jobs {
        tracing::debug!(job = ?job, "running REST job");
        if finished.send(run_job(backend, job)).is_err() || wake.send(AppEvent::BackendReady).is_err()
        {
            tracing::debug!("event loop gone; REST worker stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        domain::ids::ConversationId,
        usecases::{list_chats::ChatListSourceError, mark_read::MarkReadSourceError},
    };

    /// Backend whose `mark_as_read` waits until the test releases it.
    struct GatedBackend {
        gate: Mutex<Receiver<()>>,
        marked: Arc<Mutex<Vec<Vec<MessageId>>>>,
    }

    impl ChatListSource for GatedBackend {
        fn list_conversations(&self) -> Result<Vec<Conversation>, ChatListSourceError> {
            Err(ChatListSourceError::Unavailable)
        }
    }

    impl MessagesSource for GatedBackend {
        fn fetch_page(
            &self,
            _conversation_id: &ConversationId,
            _page: u32,
        ) -> Result<MessagePage, MessagesSourceError> {
            Err(MessagesSourceError::PageOutOfRange)
        }
    }

    impl ReadMarkerSource for GatedBackend {
        fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), MarkReadSourceError> {
            let released = self
                .gate
                .lock()
                .expect("gate lock")
                .recv_timeout(Duration::from_secs(5));
            if released.is_err() {
                return Err(MarkReadSourceError::Unavailable);
            }
            self.marked.lock().expect("marked lock").push(message_ids.to_vec());
            Ok(())
        }
    }

    #[test]
    fn results_arrive_after_the_wake_event() {
        let (release, gate) = mpsc::channel();
        let marked = Arc::new(Mutex::new(Vec::new()));
        let backend = GatedBackend {
            gate: Mutex::new(gate),
            marked: Arc::clone(&marked),
        };
        let (wake_tx, wake_rx) = mpsc::channel();
        let mut worker = BackendWorker::start(backend, wake_tx).expect("worker starts");

        worker.submit(BackendJob::MarkRead(vec![MessageId::server(1)]));
        assert!(worker.take_finished().is_empty());

        release.send(()).expect("worker waits on the gate");
        assert_eq!(
            wake_rx.recv_timeout(Duration::from_secs(5)),
            Ok(AppEvent::BackendReady)
        );
        assert_eq!(
            worker.take_finished(),
            vec![JobResult::MarkRead {
                message_ids: vec![MessageId::server(1)],
                result: Ok(()),
            }]
        );
        assert_eq!(*marked.lock().expect("marked lock"), vec![vec![MessageId::server(1)]]);
    }

    #[test]
    fn run_job_maps_source_results() {
        let (_release, gate) = mpsc::channel();
        let backend = GatedBackend {
            gate: Mutex::new(gate),
            marked: Arc::default(),
        };
        let request = PageRequest {
            conversation_id: ConversationId::new("7"),
            page: 3,
        };

        assert_eq!(
            run_job(&backend, BackendJob::ListChats),
            JobResult::ChatList(Err(ListChatsError::TemporarilyUnavailable))
        );
        assert_eq!(
            run_job(&backend, BackendJob::LoadPage(request.clone())),
            JobResult::Page {
                request,
                fetched: Err(MessagesSourceError::PageOutOfRange),
            }
        );
    }
}
