//! Association establishment, release and abort
//!
//! An [`Association`] goes through
//! `Idle -> Connecting -> Negotiating -> Established -> Releasing -> Closed`,
//! with `Aborted` reachable from every non-terminal state. Once established,
//! DIMSE traffic is handled by the dispatcher tasks; this module only owns the
//! negotiation and the state transitions around it.

use crate::dimse::command::{CommandSet, Priority};
use crate::dimse::dataset::DataSet;
use crate::error::{DicomError, Result};
use crate::io::dispatcher::{Dispatcher, QueueConfig, ResponseStream, Termination};
use crate::io::transport::Transport;
use crate::protocol::header::AeTitle;
use crate::protocol::message::Pdu;
use crate::protocol::reader::PduReader;
use crate::protocol::types::{
    Abort, AbortReason, AssociateAc, AssociateRq, PresentationContextProposed, ReleaseRq,
    UserVariableItem,
};
use crate::protocol::uid::{self, TransferSyntax};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_rustls::rustls;
use tracing::{debug, info, warn};

/// Default time to wait for A-RELEASE-RP
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationState {
    Idle,
    Connecting,
    Negotiating,
    Established,
    Releasing,
    Closed,
    Aborted,
}

impl AssociationState {
    /// `Closed` and `Aborted` are never left
    pub fn is_terminal(self) -> bool {
        matches!(self, AssociationState::Closed | AssociationState::Aborted)
    }
}

/// Move to `new` unless the association already reached a terminal state
pub(crate) fn transition(state: &watch::Sender<AssociationState>, new: AssociationState) {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == new {
            return false;
        }
        info!(from = ?*current, to = ?new, "Association state changed");
        *current = new;
        true
    });
}

/// Parameters of an association request
#[derive(Debug, Clone)]
pub struct AssociationOptions {
    pub calling_ae: AeTitle,
    pub called_ae: AeTitle,
    /// Abstract syntaxes to propose, one presentation context each
    pub abstract_syntaxes: Vec<String>,
    /// Largest P-DATA-TF PDU we accept (0 = unlimited)
    pub max_pdu_length: u32,
    pub release_timeout: Duration,
    pub queue: QueueConfig,
    /// Wrap the connection in TLS with this configuration
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Name checked against the server certificate (defaults to the host)
    pub tls_server_name: Option<String>,
}

impl AssociationOptions {
    pub fn new(calling_ae: AeTitle, called_ae: AeTitle) -> Self {
        AssociationOptions {
            calling_ae,
            called_ae,
            abstract_syntaxes: Vec::new(),
            max_pdu_length: uid::DEFAULT_MAX_PDU,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            queue: QueueConfig::default(),
            tls: None,
            tls_server_name: None,
        }
    }

    pub fn with_abstract_syntax(mut self, abstract_syntax: impl Into<String>) -> Self {
        self.abstract_syntaxes.push(abstract_syntax.into());
        self
    }

    pub fn with_max_pdu_length(mut self, max_pdu_length: u32) -> Self {
        self.max_pdu_length = max_pdu_length;
        self
    }

    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Presentation contexts to propose: odd IDs, Explicit VR LE preferred
    fn proposed_contexts(&self) -> Vec<PresentationContextProposed> {
        self.abstract_syntaxes
            .iter()
            .enumerate()
            .map(|(i, abstract_syntax)| PresentationContextProposed {
                id: (2 * i + 1) as u8,
                abstract_syntax: abstract_syntax.clone(),
                transfer_syntaxes: vec![
                    uid::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                    uid::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                ],
            })
            .collect()
    }

    fn user_variables(&self) -> Vec<UserVariableItem> {
        vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUid(uid::IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::AsyncOperationsWindow {
                invoked: 1,
                performed: 1,
            },
            UserVariableItem::ImplementationVersionName(
                uid::IMPLEMENTATION_VERSION_NAME.to_string(),
            ),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.abstract_syntaxes.is_empty() {
            return Err(DicomError::InvalidConfig(
                "at least one abstract syntax must be proposed".to_string(),
            ));
        }
        if self.abstract_syntaxes.len() > 128 {
            return Err(DicomError::InvalidConfig(format!(
                "too many abstract syntaxes: {} (max: 128)",
                self.abstract_syntaxes.len()
            )));
        }
        Ok(())
    }
}

/// Presentation context accepted by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntax: TransferSyntax,
}

/// An established association with a remote Application Entity
///
/// Dropping an association that is still established sends A-ABORT.
pub struct Association {
    contexts: Vec<NegotiatedContext>,
    peer_max_pdu_length: u32,
    release_timeout: Duration,
    tls: bool,
    state: watch::Receiver<AssociationState>,
    dispatcher: Dispatcher,
}

impl Association {
    /// Connect and negotiate an association
    ///
    /// # Errors
    /// - [`DicomError::ConnectionError`] if the TCP or TLS connection fails
    /// - [`DicomError::AssociationRejected`] on A-ASSOCIATE-RJ
    /// - [`DicomError::NoAcceptedContext`] if the peer accepted no proposed context
    /// - [`DicomError::AssociationAborted`] if the peer aborts or hangs up
    /// - [`DicomError::ProtocolViolation`] on malformed or unexpected PDUs
    pub async fn establish(host: &str, port: u16, options: AssociationOptions) -> Result<Self> {
        options.validate()?;

        let (state_tx, state_rx) = watch::channel(AssociationState::Idle);
        transition(&state_tx, AssociationState::Connecting);

        let tls = options.tls.clone().map(|config| {
            let name = options
                .tls_server_name
                .clone()
                .unwrap_or_else(|| host.to_string());
            (config, name)
        });
        let mut transport = match Transport::connect(host, port, tls).await {
            Ok(transport) => transport,
            Err(e) => {
                transition(&state_tx, AssociationState::Closed);
                return Err(e);
            }
        };

        transition(&state_tx, AssociationState::Negotiating);
        let proposed = options.proposed_contexts();
        let rq = AssociateRq::new(
            options.calling_ae.clone(),
            options.called_ae.clone(),
            proposed.clone(),
            options.user_variables(),
        );
        info!(
            calling_ae = %options.calling_ae.as_str(),
            called_ae = %options.called_ae.as_str(),
            contexts = proposed.len(),
            "Requesting association"
        );

        let mut reader = PduReader::new(options.max_pdu_length);
        let ac = match negotiate(&mut transport, &mut reader, rq).await {
            Ok(ac) => ac,
            Err(e) => {
                let terminal = match e {
                    DicomError::AssociationRejected { .. } => AssociationState::Closed,
                    _ => AssociationState::Aborted,
                };
                transition(&state_tx, terminal);
                return Err(e);
            }
        };

        let contexts = accepted_contexts(&proposed, &ac);
        if contexts.is_empty() {
            warn!("Peer accepted none of the proposed presentation contexts");
            send_abort(&mut transport, Abort::user()).await;
            transition(&state_tx, AssociationState::Aborted);
            return Err(DicomError::NoAcceptedContext {
                abstract_syntax: options.abstract_syntaxes.join(", "),
            });
        }

        let peer_max_pdu_length = ac.max_pdu_length().unwrap_or_else(|| {
            debug!("Peer announced no maximum PDU length");
            uid::DEFAULT_MAX_PDU
        });
        let is_tls = transport.is_tls();
        transition(&state_tx, AssociationState::Established);
        info!(
            accepted = contexts.len(),
            peer_max_pdu_length,
            tls = is_tls,
            "Association established"
        );

        let transfer_syntaxes: HashMap<u8, TransferSyntax> = contexts
            .iter()
            .map(|ctx| (ctx.id, ctx.transfer_syntax))
            .collect();
        let dispatcher = Dispatcher::spawn(
            transport,
            reader,
            transfer_syntaxes,
            peer_max_pdu_length,
            options.queue.clone(),
            state_tx,
        );

        Ok(Association {
            contexts,
            peer_max_pdu_length,
            release_timeout: options.release_timeout,
            tls: is_tls,
            state: state_rx,
            dispatcher,
        })
    }

    pub fn state(&self) -> AssociationState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<AssociationState> {
        self.state.clone()
    }

    pub fn contexts(&self) -> &[NegotiatedContext] {
        &self.contexts
    }

    /// Accepted presentation context for an abstract syntax
    pub fn context_for(&self, abstract_syntax: &str) -> Result<&NegotiatedContext> {
        self.contexts
            .iter()
            .find(|ctx| ctx.abstract_syntax == abstract_syntax)
            .ok_or_else(|| DicomError::NoAcceptedContext {
                abstract_syntax: abstract_syntax.to_string(),
            })
    }

    /// Maximum PDU length announced by the peer
    pub fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Send C-ECHO-RQ
    pub async fn send_echo(&self) -> Result<ResponseStream> {
        let ctx = self.context_for(uid::VERIFICATION)?;
        self.dispatcher
            .send(ctx.id, CommandSet::echo_rq, None)
            .await
    }

    /// Send C-FIND-RQ with `identifier` for the given information model
    pub async fn send_find(
        &self,
        sop_class_uid: &str,
        identifier: &DataSet,
        priority: Priority,
    ) -> Result<ResponseStream> {
        let ctx = self.context_for(sop_class_uid)?;
        let data = identifier.encode(ctx.transfer_syntax)?;
        debug!(
            sop_class = %sop_class_uid,
            attributes = identifier.len(),
            transfer_syntax = ?ctx.transfer_syntax,
            "Sending query"
        );
        self.dispatcher
            .send(
                ctx.id,
                |message_id| CommandSet::find_rq(message_id, sop_class_uid, priority),
                Some(data),
            )
            .await
    }

    /// Release the association gracefully
    ///
    /// # Errors
    /// - [`DicomError::ReleaseTimeout`] if no A-RELEASE-RP arrives within the
    ///   release timeout; the connection is closed regardless
    pub async fn release(self) -> Result<()> {
        match self.state() {
            AssociationState::Established => {}
            AssociationState::Closed => return Ok(()),
            other => {
                return Err(DicomError::AssociationAborted(format!(
                    "cannot release an association in state {:?}",
                    other
                )))
            }
        }

        let shared = self.dispatcher.shared();
        shared.set_state(AssociationState::Releasing);
        let released = self.dispatcher.expect_release();
        self.dispatcher
            .send_pdu(Pdu::ReleaseRq(ReleaseRq), false)
            .await?;

        match tokio::time::timeout(self.release_timeout, released).await {
            Ok(Ok(())) => {
                self.dispatcher
                    .shutdown(&Termination::Aborted("association released".to_string()));
                Ok(())
            }
            Ok(Err(_)) => {
                warn!("Connection closed before A-RELEASE-RP");
                shared.set_state(AssociationState::Closed);
                Ok(())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.release_timeout.as_millis() as u64,
                    "No A-RELEASE-RP received, closing connection"
                );
                shared.set_state(AssociationState::Closed);
                self.dispatcher
                    .shutdown(&Termination::Aborted("association released".to_string()));
                Err(DicomError::ReleaseTimeout)
            }
        }
    }

    /// Abort the association (A-ABORT) and fail all pending requests
    pub async fn abort(&self) {
        self.dispatcher
            .abort(Termination::Aborted("aborted by local service user".to_string()))
            .await;
    }

    /// Abort after an external deadline elapsed
    ///
    /// Pending requests fail with [`DicomError::Timeout`].
    pub async fn abort_on_timeout(&self, elapsed: Duration) {
        self.dispatcher.abort(Termination::Timeout(elapsed)).await;
    }
}

impl Drop for Association {
    fn drop(&mut self) {
        self.dispatcher.abort_detached();
    }
}

impl std::fmt::Debug for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association")
            .field("state", &self.state())
            .field("contexts", &self.contexts)
            .field("peer_max_pdu_length", &self.peer_max_pdu_length)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Send A-ASSOCIATE-RQ and wait for the answer
async fn negotiate(
    transport: &mut Transport,
    reader: &mut PduReader,
    rq: AssociateRq,
) -> Result<AssociateAc> {
    let bytes = Pdu::AssociateRq(rq).encode()?;
    transport.write_all(&bytes).await?;
    transport.flush().await?;

    let pdu = match reader.read_pdu(transport).await {
        Ok(Some(pdu)) => pdu,
        Ok(None) => {
            return Err(DicomError::AssociationAborted(
                "connection closed during negotiation".to_string(),
            ))
        }
        Err(DicomError::ProtocolViolation(reason)) => {
            send_abort(
                transport,
                Abort::provider(AbortReason::InvalidPduParameterValue),
            )
            .await;
            return Err(DicomError::ProtocolViolation(reason));
        }
        Err(e) => return Err(e),
    };

    match pdu {
        Pdu::AssociateAc(ac) => Ok(ac),
        Pdu::AssociateRj(rj) => {
            warn!(reason = %rj, "Association rejected");
            let _ = transport.shutdown().await;
            Err(DicomError::AssociationRejected {
                reason: rj.to_string(),
            })
        }
        Pdu::Abort(abort) => {
            warn!(reason = %abort, "Association aborted during negotiation");
            Err(DicomError::AssociationAborted(abort.to_string()))
        }
        other => {
            let reason = format!("Unexpected {} during negotiation", other.pdu_type());
            send_abort(transport, Abort::provider(AbortReason::UnexpectedPdu)).await;
            Err(DicomError::ProtocolViolation(reason))
        }
    }
}

fn accepted_contexts(
    proposed: &[PresentationContextProposed],
    ac: &AssociateAc,
) -> Vec<NegotiatedContext> {
    let mut contexts = Vec::new();
    for result in &ac.presentation_contexts {
        let Some(proposal) = proposed.iter().find(|p| p.id == result.id) else {
            warn!(id = result.id, "Answer for a presentation context never proposed");
            continue;
        };
        if !result.is_accepted() {
            debug!(
                id = result.id,
                abstract_syntax = %proposal.abstract_syntax,
                reason = ?result.reason,
                "Presentation context rejected"
            );
            continue;
        }
        match TransferSyntax::from_uid(&result.transfer_syntax) {
            Some(transfer_syntax) => contexts.push(NegotiatedContext {
                id: result.id,
                abstract_syntax: proposal.abstract_syntax.clone(),
                transfer_syntax,
            }),
            None => warn!(
                id = result.id,
                transfer_syntax = %result.transfer_syntax,
                "Accepted transfer syntax not supported, ignoring context"
            ),
        }
    }
    contexts
}

async fn send_abort(transport: &mut Transport, abort: Abort) {
    if let Ok(bytes) = Pdu::Abort(abort).encode() {
        let _ = transport.write_all(&bytes).await;
    }
    let _ = transport.shutdown().await;
}
