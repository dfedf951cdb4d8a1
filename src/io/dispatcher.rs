//! Service dispatcher: request/response correlation on an established association
//!
//! One read-loop task owns the read half of the transport and turns incoming
//! PDUs into DIMSE messages. One writer task owns the write half; every PDU
//! goes through its channel, so the PDUs of one request are never interleaved
//! with those of another.
//!
//! Outstanding requests live in a pending table keyed by message ID. Each has
//! its own response channel (unbounded by default, optionally bounded to apply
//! backpressure on the read loop). Association-level failures are broadcast
//! to every pending request.

use crate::dimse::command::{CommandSet, StatusType};
use crate::dimse::dataset::DataSet;
use crate::dimse::fragment::{fragment, DimseMessage, Reassembler};
use crate::error::{DicomError, Result};
use crate::io::association::{transition, AssociationState};
use crate::io::transport::Transport;
use crate::protocol::message::Pdu;
use crate::protocol::reader::PduReader;
use crate::protocol::types::{Abort, AbortReason, ReleaseRp};
use crate::protocol::uid::TransferSyntax;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Buffering of responses between the read loop and a consumer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of undelivered responses per request (None = unbounded)
    pub capacity: Option<usize>,
}

impl QueueConfig {
    /// Never block the read loop (default)
    pub fn unbounded() -> Self {
        Self { capacity: None }
    }

    /// Block the read loop once `capacity` responses are waiting
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
        }
    }
}

/// One response to a DIMSE request
#[derive(Debug, Clone, PartialEq)]
pub enum DimseResponse {
    /// One match (status 0xFF00/0xFF01) with its identifier
    Pending(DataSet),
    /// Final success
    Success,
    /// Final status 0xFE00 after a C-CANCEL
    Cancelled,
    /// Any other final status
    Failure {
        status: u16,
        error_comment: Option<String>,
    },
}

impl DimseResponse {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DimseResponse::Pending(_))
    }
}

/// Why the association stopped serving requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Termination {
    Aborted(String),
    Timeout(Duration),
    Violation(String),
    Incomplete(String),
}

impl Termination {
    fn to_error(&self) -> DicomError {
        match self {
            Termination::Aborted(reason) => DicomError::AssociationAborted(reason.clone()),
            Termination::Timeout(elapsed) => DicomError::Timeout { elapsed: *elapsed },
            Termination::Violation(reason) => DicomError::ProtocolViolation(reason.clone()),
            Termination::Incomplete(reason) => DicomError::IncompleteMessage(reason.clone()),
        }
    }

    fn from_error(err: &DicomError) -> Self {
        match err {
            DicomError::ProtocolViolation(reason) => Termination::Violation(reason.clone()),
            DicomError::IncompleteMessage(reason) => Termination::Incomplete(reason.clone()),
            DicomError::Timeout { elapsed } => Termination::Timeout(*elapsed),
            other => Termination::Aborted(other.to_string()),
        }
    }
}

#[derive(Clone)]
enum ResponseSender {
    Bounded(mpsc::Sender<DimseResponse>),
    Unbounded(mpsc::UnboundedSender<DimseResponse>),
}

impl ResponseSender {
    /// Returns `false` if the consumer is gone
    async fn send(&self, response: DimseResponse) -> bool {
        match self {
            ResponseSender::Bounded(tx) => tx.send(response).await.is_ok(),
            ResponseSender::Unbounded(tx) => tx.send(response).is_ok(),
        }
    }
}

enum ResponseReceiver {
    Bounded(mpsc::Receiver<DimseResponse>),
    Unbounded(mpsc::UnboundedReceiver<DimseResponse>),
}

impl ResponseReceiver {
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<DimseResponse>> {
        match self {
            ResponseReceiver::Bounded(rx) => rx.poll_recv(cx),
            ResponseReceiver::Unbounded(rx) => rx.poll_recv(cx),
        }
    }
}

struct PendingEntry {
    sender: ResponseSender,
    termination: Arc<OnceLock<Termination>>,
}

struct WriteCommand {
    pdus: Vec<Bytes>,
    /// Shut the write half down after these PDUs
    close: bool,
    ack: Option<oneshot::Sender<std::io::Result<()>>>,
}

/// State shared by the association handle, the read loop and response streams
pub(crate) struct Shared {
    pending: Mutex<HashMap<u16, PendingEntry>>,
    next_message_id: AtomicU16,
    state: watch::Sender<AssociationState>,
    release_waiter: Mutex<Option<oneshot::Sender<()>>>,
    transfer_syntaxes: HashMap<u8, TransferSyntax>,
    peer_max_pdu_length: u32,
    queue: QueueConfig,
    writer: mpsc::UnboundedSender<WriteCommand>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u16, PendingEntry>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn state(&self) -> AssociationState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, new: AssociationState) {
        transition(&self.state, new);
    }

    /// Fail every pending request; buffered responses are discarded by the streams
    fn fail_all(&self, termination: &Termination) {
        let drained: Vec<(u16, PendingEntry)> = self.pending().drain().collect();
        for (message_id, entry) in drained {
            let _ = entry.termination.set(termination.clone());
            debug!(message_id, reason = ?termination, "Pending request failed");
        }
    }

    fn transfer_syntax(&self, presentation_context_id: u8) -> Result<TransferSyntax> {
        self.transfer_syntaxes
            .get(&presentation_context_id)
            .copied()
            .ok_or_else(|| {
                DicomError::violation(format!(
                    "Message on unknown presentation context {}",
                    presentation_context_id
                ))
            })
    }

    /// Queue PDUs on the writer task and wait until they are written
    async fn write(&self, pdus: Vec<Bytes>, close: bool) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.writer
            .send(WriteCommand {
                pdus,
                close,
                ack: Some(ack),
            })
            .map_err(|_| DicomError::AssociationAborted("connection closed".to_string()))?;
        match done.await {
            Ok(result) => result.map_err(DicomError::Io),
            Err(_) => Err(DicomError::AssociationAborted(
                "connection closed".to_string(),
            )),
        }
    }

    /// Queue PDUs without waiting (usable from `Drop`)
    fn write_detached(&self, pdus: Vec<Bytes>, close: bool) {
        let _ = self.writer.send(WriteCommand {
            pdus,
            close,
            ack: None,
        });
    }

    async fn send_message(
        &self,
        presentation_context_id: u8,
        command: &CommandSet,
        data: Option<&[u8]>,
    ) -> Result<()> {
        let command_bytes = command.encode()?;
        let pdus = fragment(
            presentation_context_id,
            &command_bytes,
            data,
            self.peer_max_pdu_length,
        )
        .into_iter()
        .map(|pdata| Pdu::PData(pdata).encode())
        .collect::<Result<Vec<_>>>()?;
        debug!(
            command = ?command.command_field,
            message_id = ?command.message_id,
            presentation_context_id,
            pdus = pdus.len(),
            "Sending DIMSE message"
        );
        self.write(pdus, false).await
    }

    async fn deliver(&self, message: DimseMessage) -> Result<()> {
        let command = message.command;
        if !command.command_field.is_response() {
            return Err(DicomError::violation(format!(
                "Unexpected {:?} received by the requestor",
                command.command_field
            )));
        }
        let message_id = command.message_id_being_responded_to.unwrap_or_default();
        let status = command.status.unwrap_or_default();

        let response = match StatusType::from_status(status) {
            StatusType::Pending => {
                let identifier = match message.data {
                    Some(bytes) => DataSet::decode(
                        &bytes,
                        self.transfer_syntax(message.presentation_context_id)?,
                    )?,
                    None => {
                        warn!(message_id, "Pending response without identifier");
                        DataSet::new()
                    }
                };
                DimseResponse::Pending(identifier)
            }
            StatusType::Success => DimseResponse::Success,
            StatusType::Cancel => DimseResponse::Cancelled,
            StatusType::Failure => DimseResponse::Failure {
                status,
                error_comment: command.error_comment,
            },
        };
        trace!(message_id, status, "DIMSE response received");

        let terminal = response.is_terminal();
        let sender = {
            let mut pending = self.pending();
            if terminal {
                pending.remove(&message_id).map(|entry| entry.sender)
            } else {
                pending.get(&message_id).map(|entry| entry.sender.clone())
            }
        };
        match sender {
            Some(sender) => {
                if !sender.send(response).await {
                    debug!(message_id, "Response consumer gone");
                    self.pending().remove(&message_id);
                }
            }
            None => warn!(message_id, "Response for unknown message ID dropped"),
        }
        Ok(())
    }
}

/// Lazy, finite sequence of responses to one request
///
/// Yields `Pending` items followed by exactly one terminal item, or an error
/// if the association fails first. Responses buffered before such a failure
/// are discarded.
pub struct ResponseStream {
    message_id: u16,
    presentation_context_id: u8,
    receiver: ResponseReceiver,
    termination: Arc<OnceLock<Termination>>,
    shared: Arc<Shared>,
    finished: bool,
}

impl ResponseStream {
    /// Message ID of the request
    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    /// Ask the peer to stop sending matches (C-CANCEL-RQ)
    ///
    /// The stream keeps yielding whatever the peer sends until its final
    /// response, normally `Cancelled`.
    pub async fn cancel(&self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        info!(message_id = self.message_id, "Cancelling request");
        self.shared
            .send_message(
                self.presentation_context_id,
                &CommandSet::cancel_rq(self.message_id),
                None,
            )
            .await
    }
}

impl Stream for ResponseStream {
    type Item = Result<DimseResponse>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(termination) = this.termination.get() {
            this.finished = true;
            return Poll::Ready(Some(Err(termination.to_error())));
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(response)) => {
                if response.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(Ok(response)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                let err = this.termination.get().map(Termination::to_error).unwrap_or_else(|| {
                    DicomError::AssociationAborted(
                        "association closed before the final response".to_string(),
                    )
                });
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.pending().remove(&self.message_id);
        }
    }
}

/// Handle to the dispatcher tasks of one association
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    read_task: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        transport: Transport,
        reader: PduReader,
        transfer_syntaxes: HashMap<u8, TransferSyntax>,
        peer_max_pdu_length: u32,
        queue: QueueConfig,
        state: watch::Sender<AssociationState>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(write_half, commands));

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            next_message_id: AtomicU16::new(1),
            state,
            release_waiter: Mutex::new(None),
            transfer_syntaxes,
            peer_max_pdu_length,
            queue,
            writer,
        });
        let read_task = tokio::spawn(read_loop(shared.clone(), read_half, reader));
        Dispatcher { shared, read_task }
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Register a request and send it
    ///
    /// `build` receives the allocated message ID and returns the command set.
    pub(crate) async fn send<F>(
        &self,
        presentation_context_id: u8,
        build: F,
        data: Option<Vec<u8>>,
    ) -> Result<ResponseStream>
    where
        F: FnOnce(u16) -> CommandSet,
    {
        if self.shared.state() != AssociationState::Established {
            return Err(DicomError::AssociationAborted(format!(
                "association is {:?}",
                self.shared.state()
            )));
        }

        let termination = Arc::new(OnceLock::new());
        let (sender, receiver) = match self.shared.queue.capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (ResponseSender::Bounded(tx), ResponseReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (ResponseSender::Unbounded(tx), ResponseReceiver::Unbounded(rx))
            }
        };

        let message_id = {
            let mut pending = self.shared.pending();
            let id = loop {
                let id = self.shared.next_message_id.fetch_add(1, Ordering::Relaxed);
                if id != 0 && !pending.contains_key(&id) {
                    break id;
                }
            };
            pending.insert(
                id,
                PendingEntry {
                    sender,
                    termination: termination.clone(),
                },
            );
            id
        };

        let stream = ResponseStream {
            message_id,
            presentation_context_id,
            receiver,
            termination,
            shared: self.shared.clone(),
            finished: false,
        };

        let command = build(message_id);
        self.shared
            .send_message(presentation_context_id, &command, data.as_deref())
            .await?;
        Ok(stream)
    }

    /// Send one control PDU and wait until it is written
    pub(crate) async fn send_pdu(&self, pdu: Pdu, close: bool) -> Result<()> {
        debug!(pdu_type = %pdu.pdu_type(), "Sending PDU");
        self.shared.write(vec![pdu.encode()?], close).await
    }

    /// Receiver completed when A-RELEASE-RP arrives
    pub(crate) fn expect_release(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .release_waiter
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Stop both tasks, failing pending requests with `termination`
    pub(crate) fn shutdown(&self, termination: &Termination) {
        self.shared.fail_all(termination);
        self.shared.write_detached(Vec::new(), true);
        self.read_task.abort();
    }

    /// Send A-ABORT and stop, failing pending requests with `termination`
    pub(crate) async fn abort(&self, termination: Termination) {
        if self.shared.state().is_terminal() {
            return;
        }
        info!(reason = ?termination, "Aborting association");
        self.shared.set_state(AssociationState::Aborted);
        self.shared.fail_all(&termination);
        self.read_task.abort();
        let abort = Pdu::Abort(Abort::user());
        match abort.encode() {
            Ok(bytes) => {
                if let Err(e) = self.shared.write(vec![bytes], true).await {
                    debug!(error = %e, "A-ABORT could not be sent");
                }
            }
            Err(e) => warn!(error = %e, "A-ABORT could not be encoded"),
        }
    }

    /// Best-effort abort without waiting, for `Drop`
    pub(crate) fn abort_detached(&self) {
        self.read_task.abort();
        if self.shared.state().is_terminal() {
            self.shared.write_detached(Vec::new(), true);
            return;
        }
        self.shared.set_state(AssociationState::Aborted);
        self.shared
            .fail_all(&Termination::Aborted("association dropped".to_string()));
        match Pdu::Abort(Abort::user()).encode() {
            Ok(bytes) => self.shared.write_detached(vec![bytes], true),
            Err(_) => self.shared.write_detached(Vec::new(), true),
        }
    }
}

async fn writer_loop(
    mut writer: WriteHalf<Transport>,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = commands.recv().await {
        let mut result = Ok(());
        for pdu in &command.pdus {
            if let Err(e) = writer.write_all(pdu).await {
                result = Err(e);
                break;
            }
            trace!(bytes = pdu.len(), "PDU written");
        }
        if result.is_ok() {
            result = writer.flush().await;
        }
        if command.close {
            let _ = writer.shutdown().await;
        }
        let stop = command.close || result.is_err();
        if let Err(e) = &result {
            warn!(error = %e, "Write to peer failed");
        }
        if let Some(ack) = command.ack {
            let _ = ack.send(result);
        }
        if stop {
            break;
        }
    }
    debug!("Writer task finished");
}

/// How the read loop ended
enum Exit {
    /// A-RELEASE-RP after our A-RELEASE-RQ
    Released,
    /// Peer A-RELEASE-RQ, answered
    PeerReleased,
    /// Peer A-ABORT
    PeerAborted(String),
    /// Malformed or unexpected input; we abort
    Violation(String, AbortReason),
    /// Connection lost or closed
    Lost(Termination),
}

async fn read_loop(shared: Arc<Shared>, mut reader: ReadHalf<Transport>, mut pdus: PduReader) {
    let mut reassembler = Reassembler::new();

    let exit = 'read: loop {
        let pdu = match pdus.read_pdu(&mut reader).await {
            Ok(Some(pdu)) => pdu,
            Ok(None) => {
                if shared.state() == AssociationState::Releasing {
                    break Exit::Lost(Termination::Aborted(
                        "connection closed during release".to_string(),
                    ));
                }
                break Exit::Lost(match reassembler.finish() {
                    Err(e) => Termination::from_error(&e),
                    Ok(()) => Termination::Aborted("connection closed by peer".to_string()),
                });
            }
            Err(DicomError::ProtocolViolation(reason)) => {
                break Exit::Violation(reason, AbortReason::InvalidPduParameterValue)
            }
            Err(e) => break Exit::Lost(Termination::from_error(&e)),
        };

        match pdu {
            Pdu::PData(pdata) => {
                for pdv in pdata.values {
                    let delivered = match reassembler.push(pdv) {
                        Ok(Some(message)) => shared.deliver(message).await,
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = delivered {
                        break 'read Exit::Violation(e.to_string(), AbortReason::NotSpecified);
                    }
                }
            }
            Pdu::ReleaseRp(_) if shared.state() == AssociationState::Releasing => {
                break Exit::Released;
            }
            Pdu::ReleaseRq(_) => break Exit::PeerReleased,
            Pdu::Abort(abort) => break Exit::PeerAborted(abort.to_string()),
            other => {
                break Exit::Violation(
                    format!("Unexpected {} on an established association", other.pdu_type()),
                    AbortReason::UnexpectedPdu,
                )
            }
        }
    };

    match exit {
        Exit::Released => {
            info!("Association released");
            shared.set_state(AssociationState::Closed);
            shared.fail_all(&Termination::Aborted("association released".to_string()));
            let waiter = shared
                .release_waiter
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(waiter) = waiter {
                let _ = waiter.send(());
            }
        }
        Exit::PeerReleased => {
            info!("Peer requested release");
            shared.fail_all(&Termination::Aborted(
                "association released by peer".to_string(),
            ));
            if let Ok(bytes) = Pdu::ReleaseRp(ReleaseRp).encode() {
                shared.write_detached(vec![bytes], true);
            }
            shared.set_state(AssociationState::Closed);
        }
        Exit::PeerAborted(reason) => {
            warn!(reason = %reason, "Association aborted by peer");
            shared.set_state(AssociationState::Aborted);
            shared.fail_all(&Termination::Aborted(reason));
            shared.write_detached(Vec::new(), true);
        }
        Exit::Violation(reason, abort_reason) => {
            warn!(reason = %reason, "Protocol violation, aborting association");
            shared.set_state(AssociationState::Aborted);
            shared.fail_all(&Termination::Violation(reason));
            match Pdu::Abort(Abort::provider(abort_reason)).encode() {
                Ok(bytes) => shared.write_detached(vec![bytes], true),
                Err(_) => shared.write_detached(Vec::new(), true),
            }
        }
        Exit::Lost(termination) => {
            warn!(reason = ?termination, "Connection lost");
            shared.set_state(AssociationState::Aborted);
            shared.fail_all(&termination);
            shared.write_detached(Vec::new(), true);
        }
    }
    // Dropping the waiter (if any) tells a pending release the connection is gone
    shared
        .release_waiter
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    debug!("Read loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimse::command::CommandField;
    use crate::dimse::tag::tags;
    use crate::protocol::uid;
    use futures::StreamExt;

    fn shared(queue: QueueConfig) -> (Arc<Shared>, mpsc::UnboundedReceiver<WriteCommand>) {
        let (writer, commands) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(AssociationState::Established);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            next_message_id: AtomicU16::new(1),
            state,
            release_waiter: Mutex::new(None),
            transfer_syntaxes: HashMap::from([(1, TransferSyntax::ExplicitVrLittleEndian)]),
            peer_max_pdu_length: uid::DEFAULT_MAX_PDU,
            queue,
            writer,
        });
        (shared, commands)
    }

    fn register(shared: &Arc<Shared>, message_id: u16) -> ResponseStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let termination = Arc::new(OnceLock::new());
        shared.pending().insert(
            message_id,
            PendingEntry {
                sender: ResponseSender::Unbounded(tx),
                termination: termination.clone(),
            },
        );
        ResponseStream {
            message_id,
            presentation_context_id: 1,
            receiver: ResponseReceiver::Unbounded(rx),
            termination,
            shared: shared.clone(),
            finished: false,
        }
    }

    fn find_rsp(message_id: u16, status: u16, data: Option<&DataSet>) -> DimseMessage {
        DimseMessage {
            presentation_context_id: 1,
            command: CommandSet::response(
                CommandField::CFindRsp,
                uid::STUDY_ROOT_QR_FIND,
                message_id,
                status,
                data.is_some(),
            ),
            data: data.map(|ds| ds.encode(TransferSyntax::ExplicitVrLittleEndian).unwrap()),
        }
    }

    #[test]
    fn test_bounded_queue_minimum() {
        assert_eq!(QueueConfig::bounded(0).capacity, Some(1));
        assert_eq!(QueueConfig::default(), QueueConfig::unbounded());
    }

    #[test]
    fn test_termination_errors() {
        let err = Termination::Timeout(Duration::from_millis(250)).to_error();
        assert!(matches!(err, DicomError::Timeout { .. }));
        let back = Termination::from_error(&DicomError::IncompleteMessage("x".to_string()));
        assert_eq!(back, Termination::Incomplete("x".to_string()));
        let other = Termination::from_error(&DicomError::ReleaseTimeout);
        assert!(matches!(other, Termination::Aborted(_)));
    }

    #[tokio::test]
    async fn test_deliver_routes_by_message_id() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let mut first = register(&shared, 1);
        let mut second = register(&shared, 2);

        let mut identifier = DataSet::new();
        identifier.put_str(tags::PATIENT_ID, "P1");
        shared.deliver(find_rsp(2, 0xFF00, Some(&identifier))).await.unwrap();
        shared.deliver(find_rsp(2, 0x0000, None)).await.unwrap();
        shared.deliver(find_rsp(1, 0xFE00, None)).await.unwrap();

        match second.next().await.unwrap().unwrap() {
            DimseResponse::Pending(ds) => assert_eq!(ds.get_str(tags::PATIENT_ID).as_deref(), Some("P1")),
            other => panic!("expected pending, got {:?}", other),
        }
        assert_eq!(second.next().await.unwrap().unwrap(), DimseResponse::Success);
        assert!(second.next().await.is_none());
        assert_eq!(first.next().await.unwrap().unwrap(), DimseResponse::Cancelled);

        // terminal responses remove their entries
        assert!(shared.pending().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_id_dropped() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let _stream = register(&shared, 1);
        assert!(shared.deliver(find_rsp(9, 0x0000, None)).await.is_ok());
        assert_eq!(shared.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_request_from_peer_is_violation() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let message = DimseMessage {
            presentation_context_id: 1,
            command: CommandSet::echo_rq(5),
            data: None,
        };
        assert!(matches!(
            shared.deliver(message).await,
            Err(DicomError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_discards_buffered_responses() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let mut stream = register(&shared, 1);
        shared
            .deliver(find_rsp(1, 0xFF00, Some(&DataSet::new())))
            .await
            .unwrap();

        shared.fail_all(&Termination::Aborted("peer went away".to_string()));
        assert!(matches!(
            stream.next().await,
            Some(Err(DicomError::AssociationAborted(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_status_carries_comment() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let mut stream = register(&shared, 1);
        let mut message = find_rsp(1, 0xC001, None);
        message.command.error_comment = Some("bad key".to_string());
        shared.deliver(message).await.unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            DimseResponse::Failure {
                status: 0xC001,
                error_comment: Some("bad key".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_stream_leaves_table() {
        let (shared, _commands) = shared(QueueConfig::unbounded());
        let stream = register(&shared, 3);
        drop(stream);
        assert!(shared.pending().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_fragments_to_peer_limit() {
        let (shared, mut commands) = shared(QueueConfig::unbounded());
        let data = vec![0u8; 40_000];
        let command = CommandSet::find_rq(1, uid::STUDY_ROOT_QR_FIND, Default::default());

        let write = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.send_message(1, &command, Some(&data)).await })
        };
        let queued = commands.recv().await.unwrap();
        assert!(!queued.close);
        // command PDU plus three data fragments
        assert_eq!(queued.pdus.len(), 4);
        assert!(queued
            .pdus
            .iter()
            .all(|pdu| pdu.len() <= uid::DEFAULT_MAX_PDU as usize + 6));
        let _ = queued.ack.unwrap().send(Ok(()));
        write.await.unwrap().unwrap();
    }
}
