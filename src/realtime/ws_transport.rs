//! tokio-tungstenite socket adapter. Each socket runs as a task on the
//! adapter's runtime and reports back to the synchronous event loop.

use std::{sync::mpsc::Sender, time::Duration};

use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    runtime::{Builder, Runtime},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message,
    },
};

use crate::{
    domain::events::{AppEvent, CloseInfo, SocketId, SocketSignal, TransportEvent},
    infra::{error::AppError, secrets::redact_text},
};

use super::connection::{ChannelError, SocketConnector, SocketHandle};

const SOCKET_EVENT_FORWARD_FAILED: &str = "SOCKET_EVENT_FORWARD_FAILED";

/// How long a local close waits for the server's close frame.
const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum SocketCommand {
    Text(String),
    Close { code: u16, reason: String },
}

pub struct WsConnector {
    runtime: Runtime,
    events: Sender<AppEvent>,
}

impl WsConnector {
    pub fn new(events: Sender<AppEvent>) -> Result<Self, AppError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("relochat-socket")
            .enable_all()
            .build()
            .map_err(AppError::RuntimeInit)?;

        Ok(Self { runtime, events })
    }
}

impl SocketConnector for WsConnector {
    fn open(&mut self, socket: SocketId, url: &str) -> Result<Box<dyn SocketHandle>, ChannelError> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.runtime.spawn(run_socket(
            socket,
            url.to_owned(),
            self.events.clone(),
            commands_rx,
        ));

        Ok(Box::new(WsHandle {
            commands: commands_tx,
        }))
    }
}

struct WsHandle {
    commands: UnboundedSender<SocketCommand>,
}

impl SocketHandle for WsHandle {
    fn send_text(&mut self, text: String) -> bool {
        self.commands.send(SocketCommand::Text(text)).is_ok()
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.commands.send(SocketCommand::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

async fn run_socket(
    socket: SocketId,
    url: String,
    events: Sender<AppEvent>,
    mut commands: UnboundedReceiver<SocketCommand>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(error) => {
            emit(&events, socket, SocketSignal::Failed(redact_text(&error.to_string())));
            emit(&events, socket, SocketSignal::Closed(None));
            return;
        }
    };

    if !emit(&events, socket, SocketSignal::Opened) {
        return;
    }

    let (mut sink, mut incoming) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Text(text)) => {
                    if let Err(error) = sink.send(Message::Text(text.into())).await {
                        emit(&events, socket, SocketSignal::Failed(redact_text(&error.to_string())));
                        emit(&events, socket, SocketSignal::Closed(None));
                        break;
                    }
                }
                Some(SocketCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let answered = sink.send(Message::Close(Some(frame))).await.is_ok()
                        && await_close_reply(&mut incoming, CLOSE_REPLY_TIMEOUT).await;
                    tracing::debug!(channel = %socket.kind, close_code = code, answered, "socket closed locally");
                    emit(&events, socket, SocketSignal::Closed(Some(CloseInfo { code, reason })));
                    break;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !emit(&events, socket, SocketSignal::Text(text.as_str().to_owned())) {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let close = frame.map(|frame| CloseInfo {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_owned(),
                    });
                    emit(&events, socket, SocketSignal::Closed(close));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    emit(&events, socket, SocketSignal::Failed(redact_text(&error.to_string())));
                    emit(&events, socket, SocketSignal::Closed(None));
                    break;
                }
                None => {
                    emit(&events, socket, SocketSignal::Closed(None));
                    break;
                }
            },
        }
    }

    tracing::debug!(
        channel = %socket.kind,
        generation = socket.generation,
        "socket task finished"
    );
}

/// Reads past anything still in flight until the peer answers a close frame.
/// Returns `false` when the peer stayed silent for `limit`.
async fn await_close_reply<S>(incoming: &mut S, limit: Duration) -> bool
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reply = tokio::time::timeout(limit, async {
        while let Some(frame) = incoming.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                return;
            }
        }
    })
    .await;

    if reply.is_err() {
        tracing::debug!("peer did not answer the close frame in time");
    }
    reply.is_ok()
}

fn emit(events: &Sender<AppEvent>, socket: SocketId, signal: SocketSignal) -> bool {
    match events.send(AppEvent::Transport(TransportEvent { socket, signal })) {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(
                code = SOCKET_EVENT_FORWARD_FAILED,
                channel = %socket.kind,
                error = %error,
                "event loop is gone; stopping socket task"
            );
            false
        }
    }
}
