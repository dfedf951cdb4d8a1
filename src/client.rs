//! Client facade: one verb per call against one remote AE
//!
//! Every call opens its own association, runs one exchange under the
//! configured deadline and releases the association. Nothing is shared
//! between calls.
//!
//! # Examples
//!
//! ```no_run
//! use dicomtools_rust::client::DicomClient;
//! use dicomtools_rust::config::ClientConfig;
//! use dicomtools_rust::query::StudyQuery;
//!
//! # async fn run() -> dicomtools_rust::error::Result<()> {
//! let client = DicomClient::new(ClientConfig::new("pacs.local", 104))?;
//! let echo = client.echo().await?;
//! println!("{} in {:?}", echo.status, echo.elapsed);
//!
//! let outcome = client.find(&StudyQuery::new().patient_id("12345")).await?;
//! for study in &outcome.records {
//!     println!("{} {}", study.patient_name, study.study_instance_uid);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::dimse::command::Priority;
use crate::dimse::dataset::DataSet;
use crate::error::{DicomError, Result};
use crate::io::association::{Association, AssociationOptions};
use crate::io::dispatcher::{DimseResponse, ResponseStream};
use crate::protocol::header::AeTitle;
use crate::protocol::uid;
use crate::query::builder::{QueryModel, StudyQuery, WorklistQuery};
use crate::query::results::{StudyRecord, WorklistRecord};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_rustls::rustls;
use tracing::{debug, info, warn};

/// Warning added when a query matched nothing
pub const NO_MATCHES_WARNING: &str = "No matching records found";

/// Outcome of a C-ECHO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoResult {
    pub host: String,
    pub port: u16,
    /// "Success" or a description of the failure
    pub status: String,
    pub elapsed: Duration,
}

impl EchoResult {
    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }
}

/// Records of a C-FIND with the non-fatal issues met on the way
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome<T> {
    /// Matches in arrival order
    pub records: Vec<T>,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

impl<T> QueryOutcome<T> {
    fn map<U>(self, f: impl FnMut(T) -> U) -> QueryOutcome<U> {
        QueryOutcome {
            records: self.records.into_iter().map(f).collect(),
            elapsed: self.elapsed,
            warnings: self.warnings,
        }
    }
}

/// DICOM service class user
#[derive(Debug, Clone)]
pub struct DicomClient {
    config: ClientConfig,
    calling_ae: AeTitle,
    called_ae: AeTitle,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl DicomClient {
    /// Create a client after validating `config`
    ///
    /// # Errors
    /// - [`DicomError::InvalidConfig`] for bad AE titles, timeouts or PDU sizes
    /// - [`DicomError::Io`] if TLS certificate files cannot be loaded
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let calling_ae = AeTitle::new(&config.calling_ae)?;
        let called_ae = AeTitle::new(&config.called_ae)?;
        let tls = if config.tls.enabled {
            Some(config.tls.client_config()?)
        } else {
            None
        };
        Ok(DicomClient {
            config,
            calling_ae,
            called_ae,
            tls,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn association_options(&self, abstract_syntax: &str) -> AssociationOptions {
        let mut options = AssociationOptions::new(self.calling_ae.clone(), self.called_ae.clone())
            .with_abstract_syntax(abstract_syntax)
            .with_max_pdu_length(self.config.max_pdu_length)
            .with_release_timeout(self.config.release_timeout())
            .with_queue(self.config.queue());
        if let Some(tls) = &self.tls {
            options = options.with_tls(tls.clone());
            options.tls_server_name = self.config.tls.server_name.clone();
        }
        options
    }

    /// Connect and negotiate within what is left of `deadline`
    async fn open(
        &self,
        abstract_syntax: &str,
        deadline: Duration,
        started: Instant,
    ) -> Result<Association> {
        let establish = Association::establish(
            &self.config.host,
            self.config.port,
            self.association_options(abstract_syntax),
        );
        match tokio::time::timeout(deadline, establish).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    "Deadline elapsed before the association was established"
                );
                Err(DicomError::Timeout {
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// Run `request` on `association` within the rest of `deadline`
    ///
    /// On elapse the association is aborted and pending requests fail with
    /// `Timeout`. Other errors abort the association if it is still open,
    /// except a failure status, after which it is released.
    async fn exchange<T>(
        association: &Association,
        deadline: Duration,
        started: Instant,
        request: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let remaining = deadline.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ DicomError::DimseFailure { .. })) => Err(e),
            Ok(Err(e)) => {
                association.abort().await;
                Err(e)
            }
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Deadline elapsed, aborting association"
                );
                association.abort_on_timeout(elapsed).await;
                Err(DicomError::Timeout { elapsed })
            }
        }
    }

    /// Release outside the deadline; a failed release only adds a warning
    ///
    /// A failure status from the peer still releases gracefully before the
    /// error is returned.
    async fn conclude<T>(association: Association, result: Result<T>) -> Result<(T, Vec<String>)> {
        let value = match result {
            Ok(value) => value,
            Err(e @ DicomError::DimseFailure { .. }) => {
                let _ = association.release().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let mut warnings = Vec::new();
        match association.release().await {
            Ok(()) => {}
            Err(DicomError::ReleaseTimeout) => {
                warnings.push("Association release timed out".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Association release failed");
                warnings.push(format!("Association release failed: {}", e));
            }
        }
        Ok((value, warnings))
    }

    /// Verify connectivity with C-ECHO
    ///
    /// # Errors
    /// Connection, negotiation and timeout errors, or
    /// [`DicomError::DimseFailure`] if the peer answers with a failure status.
    pub async fn echo(&self) -> Result<EchoResult> {
        let started = Instant::now();
        let deadline = self.config.echo_timeout();
        let association = self.open(uid::VERIFICATION, deadline, started).await?;

        let request = async {
            let stream = association.send_echo().await?;
            final_response(stream).await
        };
        let result = Self::exchange(&association, deadline, started, request).await;
        let elapsed = started.elapsed();

        let ((), warnings) = Self::conclude(association, result).await?;
        for warning in &warnings {
            debug!(warning = %warning, "C-ECHO completed with warning");
        }
        info!(
            host = %self.config.host,
            port = self.config.port,
            elapsed_ms = elapsed.as_millis() as u64,
            "C-ECHO succeeded"
        );
        Ok(EchoResult {
            host: self.config.host.clone(),
            port: self.config.port,
            status: "Success".to_string(),
            elapsed,
        })
    }

    /// C-ECHO that never fails: errors become the status text
    pub async fn echo_report(&self) -> EchoResult {
        let started = Instant::now();
        match self.echo().await {
            Ok(result) => result,
            Err(e) => {
                let status = match &e {
                    DicomError::Timeout { .. } => "Failed: Connection timeout".to_string(),
                    DicomError::AssociationRejected { reason } => {
                        format!("Association was rejected. Reason: {}", reason)
                    }
                    other => format!("Failed: {}", other),
                };
                warn!(error = %e, "C-ECHO failed");
                EchoResult {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    status,
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Study level C-FIND (Study Root)
    pub async fn find(&self, query: &StudyQuery) -> Result<QueryOutcome<StudyRecord>> {
        let outcome = self
            .find_identifiers(QueryModel::StudyRoot, &query.identifier())
            .await?;
        Ok(outcome.map(|identifier| StudyRecord::from_identifier(&identifier)))
    }

    /// Modality Worklist C-FIND
    pub async fn worklist(&self, query: &WorklistQuery) -> Result<QueryOutcome<WorklistRecord>> {
        let outcome = self
            .find_identifiers(QueryModel::ModalityWorklist, &query.identifier())
            .await?;
        Ok(outcome.map(|identifier| WorklistRecord::from_identifier(&identifier)))
    }

    /// C-FIND with a caller-built identifier, returning the raw matches
    ///
    /// # Errors
    /// - [`DicomError::Timeout`] if no final response arrives within the query timeout
    /// - [`DicomError::AssociationAborted`] if the association fails mid-query;
    ///   matches received so far are discarded
    /// - [`DicomError::DimseFailure`] if the peer ends the query with a failure status
    pub async fn find_identifiers(
        &self,
        model: QueryModel,
        identifier: &DataSet,
    ) -> Result<QueryOutcome<DataSet>> {
        let started = Instant::now();
        let deadline = self.config.timeout();
        let sop_class = model.sop_class_uid();
        let association = self.open(sop_class, deadline, started).await?;

        let request = async {
            let stream = association
                .send_find(sop_class, identifier, Priority::Medium)
                .await?;
            collect_matches(stream).await
        };
        let result = Self::exchange(&association, deadline, started, request).await;
        let elapsed = started.elapsed();

        let (records, mut warnings) = Self::conclude(association, result).await?;
        if records.is_empty() {
            warnings.insert(0, NO_MATCHES_WARNING.to_string());
        }
        info!(
            model = ?model,
            matches = records.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "C-FIND completed"
        );
        Ok(QueryOutcome {
            records,
            elapsed,
            warnings,
        })
    }
}

/// Wait for the final response of a request without data
async fn final_response(mut stream: ResponseStream) -> Result<()> {
    while let Some(response) = stream.next().await {
        match response? {
            DimseResponse::Success => return Ok(()),
            DimseResponse::Failure {
                status,
                error_comment,
            } => {
                return Err(DicomError::DimseFailure {
                    status,
                    error_comment,
                })
            }
            DimseResponse::Cancelled => {
                return Err(DicomError::DimseFailure {
                    status: 0xFE00,
                    error_comment: None,
                })
            }
            DimseResponse::Pending(_) => {
                debug!(message_id = stream.message_id(), "Ignoring pending response")
            }
        }
    }
    Err(DicomError::AssociationAborted(
        "response stream ended without a final status".to_string(),
    ))
}

/// Gather pending identifiers until the final response
async fn collect_matches(mut stream: ResponseStream) -> Result<Vec<DataSet>> {
    let mut matches = Vec::new();
    while let Some(response) = stream.next().await {
        match response? {
            DimseResponse::Pending(identifier) => matches.push(identifier),
            DimseResponse::Success => return Ok(matches),
            DimseResponse::Cancelled => {
                warn!(matches = matches.len(), "Query cancelled by peer");
                return Ok(matches);
            }
            DimseResponse::Failure {
                status,
                error_comment,
            } => {
                return Err(DicomError::DimseFailure {
                    status,
                    error_comment,
                })
            }
        }
    }
    Err(DicomError::AssociationAborted(
        "response stream ended without a final status".to_string(),
    ))
}
