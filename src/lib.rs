//! DICOM Upper Layer protocol client in Rust
//!
//! This library implements the service class user side of the DICOM network
//! protocol (PS3.7/PS3.8): association negotiation, DIMSE messaging, and the
//! C-ECHO and C-FIND services, including Modality Worklist queries.
//!
//! # Features
//!
//! - **Complete PDU codec** - A-ASSOCIATE-RQ/AC/RJ, P-DATA-TF, A-RELEASE-RQ/RP, A-ABORT
//! - **Streaming decoding** - PDUs are read incrementally from the byte stream
//! - **DIMSE fragmentation** - messages split to the peer's maximum PDU length and reassembled
//! - **Async I/O** - tokio based, one read loop and one writer task per association
//! - **TLS** - rustls with system roots, custom CA bundles and client certificates
//! - **Typed results** - study and worklist records instead of raw attributes
//!
//! # Quick Start
//!
//! ## Verification (C-ECHO)
//!
//! ```no_run
//! use dicomtools_rust::{ClientConfig, DicomClient};
//!
//! # async fn run() -> dicomtools_rust::Result<()> {
//! let client = DicomClient::new(ClientConfig::new("127.0.0.1", 104))?;
//! let result = client.echo_report().await;
//! println!("{}:{} {} ({:?})", result.host, result.port, result.status, result.elapsed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Study query (C-FIND)
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use dicomtools_rust::query::{DateRange, StudyQuery};
//! use dicomtools_rust::{ClientConfig, DicomClient};
//!
//! # async fn run() -> dicomtools_rust::Result<()> {
//! let client = DicomClient::new(ClientConfig {
//!     called_ae: "PACS".to_string(),
//!     ..ClientConfig::new("pacs.local", 11112)
//! })?;
//!
//! let query = StudyQuery::new()
//!     .patient_name("DOE^*")
//!     .study_date(DateRange::from(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()));
//!
//! let outcome = client.find(&query).await?;
//! for study in &outcome.records {
//!     println!("{} {} {}", study.patient_id, study.modalities, study.study_description);
//! }
//! for warning in &outcome.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with an association directly
//!
//! ```no_run
//! use dicomtools_rust::io::{Association, AssociationOptions, DimseResponse};
//! use dicomtools_rust::protocol::{uid, AeTitle};
//! use futures::StreamExt;
//!
//! # async fn run() -> dicomtools_rust::Result<()> {
//! let options = AssociationOptions::new(AeTitle::new("SCU")?, AeTitle::new("SCP")?)
//!     .with_abstract_syntax(uid::VERIFICATION);
//! let association = Association::establish("127.0.0.1", 104, options).await?;
//!
//! let mut responses = association.send_echo().await?;
//! while let Some(response) = responses.next().await {
//!     if response? == DimseResponse::Success {
//!         println!("echo ok");
//!     }
//! }
//! association.release().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ## Module Structure
//!
//! - **`protocol`** - Upper layer PDUs
//!   - `header` - 6-byte PDU header, AE titles
//!   - `types` - one module per PDU family
//!   - `reader` - incremental PDU reader with size limits
//!
//! - **`dimse`** - DIMSE messages
//!   - `command` - command sets (group 0000)
//!   - `dataset` - data sets in Implicit/Explicit VR Little Endian
//!   - `fragment` - P-DATA-TF fragmentation and reassembly
//!
//! - **`io`** - Network layer
//!   - `Association` - negotiation, release, abort
//!   - `dispatcher` - message ID correlation and response streams
//!   - `transport` / `tls` - TCP and TLS connections
//!
//! - **`query`** - identifiers, DA/TM/DT parsing, result records
//! - **`client`** - `DicomClient` running one verb per call under a deadline
//! - **`config`** - `ClientConfig`, loadable from TOML
//! - **`error`** - `DicomError` and `Result<T>`
//!
//! ## Timeouts
//!
//! Each facade call runs under one deadline covering connection, negotiation
//! and the exchange. When it elapses the association is aborted and the call
//! fails with [`DicomError::Timeout`], which is distinct from a failure status
//! returned by the peer ([`DicomError::DimseFailure`]).
//!
//! # Logging
//!
//! The library emits `tracing` events. Install a subscriber to see them:
//!
//! ```no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter(tracing_subscriber::EnvFilter::new("dicomtools_rust=debug"))
//!     .init();
//! ```

pub mod client;
pub mod config;
pub mod dimse;
pub mod error;
pub mod io;
pub mod protocol;
pub mod query;

// Re-export commonly used types
pub use client::{DicomClient, EchoResult, QueryOutcome};
pub use config::ClientConfig;
pub use error::{DicomError, Result};
