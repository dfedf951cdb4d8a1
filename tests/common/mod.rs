//! In-process mock SCP for integration tests
//!
//! Speaks the upper layer protocol with the crate's own codecs and follows a
//! [`Script`] describing how to answer. Everything it observes is recorded as
//! [`Event`]s for assertions.

#![allow(dead_code)]

use dicomtools_rust::dimse::command::{CommandField, CommandSet};
use dicomtools_rust::dimse::fragment::{fragment, DimseMessage, Reassembler};
use dicomtools_rust::dimse::DataSet;
use dicomtools_rust::protocol::types::{
    Abort, AssociateAc, AssociateRj, PresentationContextResult, PresentationContextResultReason,
    ReleaseRp, ReleaseRq, UserVariableItem,
};
use dicomtools_rust::protocol::uid::{self, TransferSyntax};
use dicomtools_rust::protocol::{Pdu, PduReader};
use dicomtools_rust::{ClientConfig, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the SCP does once a request arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Send all matches, then the final status
    Respond,
    /// Send this many matches, then A-ABORT
    AbortAfter(usize),
    /// Never answer
    Silent,
    /// Send bytes that are not a PDU
    Garbage,
    /// Send the matches, then A-RELEASE-RQ instead of a final status
    ReleaseAfterMatches,
    /// Send the matches, then wait for C-CANCEL-RQ and answer 0xFE00
    WaitForCancel,
    /// Send the matches and close the connection halfway through the final response
    TruncateFinal,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub reject: Option<AssociateRj>,
    /// Abstract syntaxes accepted (all if empty)
    pub accepted: Vec<String>,
    pub transfer_syntax: TransferSyntax,
    pub max_pdu_length: u32,
    pub behavior: Behavior,
    pub matches: Vec<DataSet>,
    pub final_status: u16,
    pub error_comment: Option<String>,
    pub answer_release: bool,
    /// Delay before each match
    pub match_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            reject: None,
            accepted: Vec::new(),
            transfer_syntax: TransferSyntax::ExplicitVrLittleEndian,
            max_pdu_length: uid::DEFAULT_MAX_PDU,
            behavior: Behavior::Respond,
            matches: Vec::new(),
            final_status: 0x0000,
            error_comment: None,
            answer_release: true,
            match_delay: Duration::ZERO,
        }
    }
}

/// Observed by the SCP
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Associated { calling_ae: String, max_pdu_length: Option<u32> },
    Echo { message_id: u16 },
    Find { message_id: u16, sop_class: String, identifier: DataSet },
    Cancel { message_id: u16 },
    ReleaseRequested,
    ReleaseConfirmed,
    Aborted,
    Closed,
}

pub struct MockScp {
    pub port: u16,
    events: Arc<Mutex<Vec<Event>>>,
    task: JoinHandle<()>,
}

impl MockScp {
    pub async fn spawn(script: Script) -> MockScp {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let events = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let log = events.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &script, &log).await;
                    log.lock().unwrap().push(Event::Closed);
                });
            }
        });

        MockScp { port, events, task }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Poll the event log until `predicate` holds or two seconds pass
    pub async fn wait_for(&self, predicate: impl Fn(&[Event]) -> bool) -> bool {
        for _ in 0..200 {
            if predicate(&self.events()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub fn identifiers(&self) -> Vec<DataSet> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Find { identifier, .. } => Some(identifier),
                _ => None,
            })
            .collect()
    }
}

impl Drop for MockScp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Connection<'a> {
    stream: TcpStream,
    reader: PduReader,
    script: &'a Script,
    log: &'a Mutex<Vec<Event>>,
    peer_max_pdu_length: u32,
    contexts: Vec<(u8, String)>,
}

impl Connection<'_> {
    fn record(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }

    async fn write(&mut self, pdu: Pdu) -> Result<()> {
        let bytes = pdu.encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send(&mut self, pc_id: u8, command: CommandSet, data: Option<&DataSet>) -> Result<()> {
        let command = command.encode()?;
        let data = match data {
            Some(ds) => Some(ds.encode(self.script.transfer_syntax)?),
            None => None,
        };
        for pdata in fragment(pc_id, &command, data.as_deref(), self.peer_max_pdu_length) {
            self.write(Pdu::PData(pdata)).await?;
        }
        Ok(())
    }

    async fn respond_find(&mut self, request: &DimseMessage, message_id: u16) -> Result<()> {
        let pc_id = request.presentation_context_id;
        let sop_class = request.command.affected_sop_class_uid.clone().unwrap_or_default();
        let pending = |has_data| {
            CommandSet::response(CommandField::CFindRsp, &sop_class, message_id, 0xFF00, has_data)
        };

        let limit = match self.script.behavior {
            Behavior::AbortAfter(n) => n.min(self.script.matches.len()),
            _ => self.script.matches.len(),
        };
        for identifier in self.script.matches[..limit].to_vec() {
            if !self.script.match_delay.is_zero() {
                tokio::time::sleep(self.script.match_delay).await;
            }
            self.send(pc_id, pending(true), Some(&identifier)).await?;
        }

        match self.script.behavior {
            Behavior::Respond => {
                let mut done = CommandSet::response(
                    CommandField::CFindRsp,
                    &sop_class,
                    message_id,
                    self.script.final_status,
                    false,
                );
                done.error_comment = self.script.error_comment.clone();
                self.send(pc_id, done, None).await
            }
            Behavior::AbortAfter(_) => {
                self.write(Pdu::Abort(Abort::user())).await?;
                self.stream.shutdown().await?;
                Ok(())
            }
            Behavior::ReleaseAfterMatches => self.write(Pdu::ReleaseRq(ReleaseRq)).await,
            Behavior::TruncateFinal => {
                let command = CommandSet::response(
                    CommandField::CFindRsp,
                    &sop_class,
                    message_id,
                    0xFF00,
                    true,
                )
                .encode()?;
                // command set complete, data set never arrives
                for pdata in fragment(pc_id, &command, None, self.peer_max_pdu_length) {
                    self.write(Pdu::PData(pdata)).await?;
                }
                self.stream.shutdown().await?;
                Ok(())
            }
            Behavior::Silent | Behavior::Garbage | Behavior::WaitForCancel => Ok(()),
        }
    }

    async fn handle(&mut self, message: DimseMessage) -> Result<()> {
        let command = &message.command;
        match command.command_field {
            CommandField::CEchoRq => {
                let message_id = command.message_id.unwrap_or_default();
                self.record(Event::Echo { message_id });
                if self.script.behavior == Behavior::Silent {
                    return Ok(());
                }
                let response = CommandSet::response(
                    CommandField::CEchoRsp,
                    uid::VERIFICATION,
                    message_id,
                    self.script.final_status,
                    false,
                );
                self.send(message.presentation_context_id, response, None).await
            }
            CommandField::CFindRq => {
                let message_id = command.message_id.unwrap_or_default();
                let identifier = match &message.data {
                    Some(bytes) => DataSet::decode(bytes, self.script.transfer_syntax)?,
                    None => DataSet::new(),
                };
                let sop_class = command.affected_sop_class_uid.clone().unwrap_or_default();
                self.record(Event::Find {
                    message_id,
                    sop_class,
                    identifier,
                });
                if self.script.behavior == Behavior::Garbage {
                    self.stream.write_all(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0x02, 0xDE, 0xAD]).await?;
                    return Ok(());
                }
                self.respond_find(&message, message_id).await
            }
            CommandField::CCancelRq => {
                let message_id = command.message_id_being_responded_to.unwrap_or_default();
                self.record(Event::Cancel { message_id });
                let sop_class = self
                    .contexts
                    .iter()
                    .find(|(id, _)| *id == message.presentation_context_id)
                    .map(|(_, sop)| sop.clone())
                    .unwrap_or_default();
                let response = CommandSet::response(
                    CommandField::CFindRsp,
                    &sop_class,
                    message_id,
                    0xFE00,
                    false,
                );
                self.send(message.presentation_context_id, response, None).await
            }
            _ => Ok(()),
        }
    }
}

async fn serve(stream: TcpStream, script: &Script, log: &Mutex<Vec<Event>>) -> Result<()> {
    let mut conn = Connection {
        stream,
        reader: PduReader::new(0),
        script,
        log,
        peer_max_pdu_length: uid::DEFAULT_MAX_PDU,
        contexts: Vec::new(),
    };

    let rq = match conn.reader.read_pdu(&mut conn.stream).await? {
        Some(Pdu::AssociateRq(rq)) => rq,
        _ => return Ok(()),
    };
    if let Some(rj) = &script.reject {
        conn.write(Pdu::AssociateRj(rj.clone())).await?;
        return Ok(());
    }

    conn.record(Event::Associated {
        calling_ae: rq.calling_ae.as_str().to_string(),
        max_pdu_length: rq.max_pdu_length(),
    });
    conn.peer_max_pdu_length = rq.max_pdu_length().unwrap_or(uid::DEFAULT_MAX_PDU);

    let mut results = Vec::new();
    for pc in &rq.presentation_contexts {
        let supported = script.accepted.is_empty() || script.accepted.contains(&pc.abstract_syntax);
        let ts = script.transfer_syntax.uid();
        let reason = if !supported {
            PresentationContextResultReason::AbstractSyntaxNotSupported
        } else if !pc.transfer_syntaxes.iter().any(|t| t == ts) {
            PresentationContextResultReason::TransferSyntaxesNotSupported
        } else {
            conn.contexts.push((pc.id, pc.abstract_syntax.clone()));
            PresentationContextResultReason::Acceptance
        };
        results.push(PresentationContextResult {
            id: pc.id,
            reason,
            transfer_syntax: ts.to_string(),
        });
    }
    let ac = AssociateAc {
        protocol_version: 1,
        calling_ae: rq.calling_ae.clone(),
        called_ae: rq.called_ae.clone(),
        application_context: rq.application_context.clone(),
        presentation_contexts: results,
        user_variables: vec![
            UserVariableItem::MaxLength(script.max_pdu_length),
            UserVariableItem::ImplementationClassUid("1.2.3.4.5".to_string()),
        ],
    };
    conn.write(Pdu::AssociateAc(ac)).await?;

    let mut reassembler = Reassembler::new();
    loop {
        let pdu = match conn.reader.read_pdu(&mut conn.stream).await? {
            Some(pdu) => pdu,
            None => return Ok(()),
        };
        match pdu {
            Pdu::PData(pdata) => {
                for pdv in pdata.values {
                    if let Some(message) = reassembler.push(pdv)? {
                        conn.handle(message).await?;
                    }
                }
            }
            Pdu::ReleaseRq(_) => {
                conn.record(Event::ReleaseRequested);
                if script.answer_release {
                    conn.write(Pdu::ReleaseRp(ReleaseRp)).await?;
                    return Ok(());
                }
                // hold the connection open without answering
                tokio::time::sleep(Duration::from_secs(5)).await;
                return Ok(());
            }
            Pdu::ReleaseRp(_) => {
                conn.record(Event::ReleaseConfirmed);
                return Ok(());
            }
            Pdu::Abort(_) => {
                conn.record(Event::Aborted);
                return Ok(());
            }
            _ => return Ok(()),
        }
    }
}

/// A study level match
pub fn study(patient_name: &str, patient_id: &str, study_uid: &str) -> DataSet {
    use dicomtools_rust::dimse::tags;
    let mut ds = DataSet::new();
    ds.put_str(tags::SPECIFIC_CHARACTER_SET, "ISO_IR 100");
    ds.put_str(tags::PATIENT_NAME, patient_name);
    ds.put_str(tags::PATIENT_ID, patient_id);
    ds.put_str(tags::PATIENT_BIRTH_DATE, "19700101");
    ds.put_str(tags::PATIENT_SEX, "O");
    ds.put_str(tags::MODALITIES_IN_STUDY, "CT\\SR");
    ds.put_str(tags::STUDY_DATE, "20210816");
    ds.put_str(tags::STUDY_TIME, "101500.250");
    ds.put_str(tags::STUDY_INSTANCE_UID, study_uid);
    ds.put_str(tags::ACCESSION_NUMBER, "ACC-1");
    ds.put_str(tags::STUDY_DESCRIPTION, "CT CHEST");
    ds
}

/// Install a test subscriber once; output only with `--nocapture`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("dicomtools_rust=debug"))
        .with_test_writer()
        .try_init();
}
