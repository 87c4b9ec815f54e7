use crate::{
    domain::{conversation_view::ConversationView, ids::MessageId, profile::LocalProfile},
    realtime::connection::SocketConnector,
    usecases::send_message::ChatSocket,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadSourceError {
    Unauthorized,
    Unavailable,
}

pub trait ReadMarkerSource {
    fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), MarkReadSourceError>;
}

impl<T> ReadMarkerSource for &T
where
    T: ReadMarkerSource + ?Sized,
{
    fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), MarkReadSourceError> {
        (*self).mark_as_read(message_ids)
    }
}

/// Socket side of read reporting.
pub trait ReceiptSink {
    /// `false` when the socket is not open.
    fn send_read_receipt(&mut self, message_ids: &[MessageId]) -> bool;
}

impl<C: SocketConnector> ReceiptSink for ChatSocket<'_, C> {
    fn send_read_receipt(&mut self, message_ids: &[MessageId]) -> bool {
        let (session, conn) = self.parts();
        session.send_read_receipt(conn, message_ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadError {
    Unauthorized,
    TemporarilyUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadReport {
    pub message_ids: Vec<MessageId>,
    pub receipt_sent: bool,
}

/// Sends the socket receipt for the other participant's unread messages and
/// returns the ids still owed to the REST endpoint. Each id is handed out
/// once; a later REST failure does not bring it back, the socket receipt
/// already told the sender.
pub fn report_newly_read(
    socket: &mut dyn ReceiptSink,
    view: &mut ConversationView,
    profile: &LocalProfile,
) -> ReadReport {
    let message_ids = view.collect_newly_read(profile);
    if message_ids.is_empty() {
        return ReadReport::default();
    }

    let receipt_sent = socket.send_read_receipt(&message_ids);
    ReadReport {
        message_ids,
        receipt_sent,
    }
}

/// REST side of read reporting. Blocks on the network.
pub fn mark_read_remote(
    source: &dyn ReadMarkerSource,
    message_ids: &[MessageId],
) -> Result<(), MarkReadError> {
    source.mark_as_read(message_ids).map_err(map_source_error)
}

fn map_source_error(error: MarkReadSourceError) -> MarkReadError {
    match error {
        MarkReadSourceError::Unauthorized => MarkReadError::Unauthorized,
        MarkReadSourceError::Unavailable => MarkReadError::TemporarilyUnavailable,
    }
}
