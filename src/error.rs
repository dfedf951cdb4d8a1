//! Error types for DICOM upper layer operations
//!
//! This module defines all error types that can occur while connecting to a
//! remote Application Entity, negotiating an association, exchanging DIMSE
//! messages and interpreting query responses.

use std::time::Duration;
use thiserror::Error;

/// DICOM network error types
///
/// All operations in this library return `Result<T, DicomError>` to provide
/// explicit error handling.
#[derive(Error, Debug)]
pub enum DicomError {
    /// TCP or TLS connection could not be established
    ///
    /// This error occurs when:
    /// - The remote host refused the connection
    /// - The host name could not be resolved
    /// - The TLS handshake failed (certificate rejected, TLS not offered by peer)
    ///
    /// No retry is attempted by this library; retry policy belongs to the caller.
    ///
    /// # Example
    /// ```no_run
    /// # use dicomtools_rust::error::DicomError;
    /// let err = DicomError::ConnectionError {
    ///     message: "pacs.local:104".to_string(),
    ///     source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
    /// };
    /// ```
    #[error("Connection error ({message}): {source}")]
    ConnectionError {
        /// Remote address or stage that failed
        message: String,
        /// Underlying I/O or TLS cause
        #[source]
        source: std::io::Error,
    },

    /// The remote Application Entity answered with A-ASSOCIATE-RJ
    ///
    /// The reason is the decoded result/source/reason triple of the reject PDU,
    /// e.g. "permanent rejection by service user: called AE title not recognized".
    #[error("Association rejected: {reason}")]
    AssociationRejected {
        /// Human readable rejection reason
        reason: String,
    },

    /// The association was aborted by the peer or locally
    ///
    /// This error occurs when:
    /// - The peer sends A-ABORT (the message names the source and reason)
    /// - The peer requests A-RELEASE while a request is still pending
    /// - The connection closes without a release handshake
    /// - A request is submitted after the association was aborted locally
    ///
    /// All requests still pending on the association fail with this error.
    /// Responses that were buffered for them are discarded.
    ///
    /// # Example
    /// ```no_run
    /// # use dicomtools_rust::error::DicomError;
    /// let err = DicomError::AssociationAborted(
    ///     "A-ABORT from service provider: unexpected PDU".to_string(),
    /// );
    /// ```
    #[error("Association aborted: {0}")]
    AssociationAborted(String),

    /// Malformed PDU or DIMSE message
    ///
    /// This error occurs when:
    /// - A PDU has an unknown type or its declared length does not match its content
    /// - An item inside a PDU overruns its parent
    /// - A command set is missing mandatory attributes
    /// - A PDU arrives that is not valid in the current association state
    /// - A data set nests sequences too deeply or a DIMSE message grows past
    ///   the reassembly limit
    ///
    /// The association is aborted when this error is raised on an open connection.
    ///
    /// # Example
    /// ```no_run
    /// # use dicomtools_rust::error::DicomError;
    /// let err = DicomError::ProtocolViolation("Unknown PDU type 0x09".to_string());
    /// ```
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The connection closed while a PDU or DIMSE message was only partially received
    #[error("Incomplete message: {0}")]
    IncompleteMessage(String),

    /// The external deadline elapsed before a terminal response arrived
    ///
    /// This error occurs when:
    /// - The peer accepts the TCP connection but never answers A-ASSOCIATE-RQ
    /// - No final C-ECHO or C-FIND response arrives within the configured window
    /// - Pending matches keep arriving but the final status does not
    ///
    /// Distinct from a failure status returned by the peer: a timeout means
    /// "no answer", not "negative answer". An established association is
    /// aborted before this error is returned.
    ///
    /// # Example
    /// ```no_run
    /// # use dicomtools_rust::error::DicomError;
    /// # use std::time::Duration;
    /// let err = DicomError::Timeout {
    ///     elapsed: Duration::from_millis(30_000),
    /// };
    /// assert_eq!(err.to_string(), "Operation timed out after 30000 ms");
    /// ```
    #[error("Operation timed out after {} ms", elapsed.as_millis())]
    Timeout {
        /// Time spent before the operation was cancelled
        elapsed: Duration,
    },

    /// A DICOM DT/DA/TM value did not match any supported format
    ///
    /// Recovered locally as an absent value wherever it occurs in responses.
    #[error("Unparsable date/time: {0:?}")]
    UnparsableDateTime(String),

    /// The peer did not answer A-RELEASE-RQ in time
    ///
    /// Non-fatal: results already obtained on the association remain valid.
    #[error("Association release timed out")]
    ReleaseTimeout,

    /// The peer accepted the association but none of the proposed presentation
    /// contexts for the requested abstract syntax
    #[error("No accepted presentation context for {abstract_syntax}")]
    NoAcceptedContext {
        /// Abstract syntax (SOP class) UID that has no usable context
        abstract_syntax: String,
    },

    /// The peer answered with a failure status (negative answer)
    ///
    /// Any final status other than Success, Pending or Cancel. Matches
    /// received before it are discarded.
    #[error("Peer returned failure status 0x{status:04X}{}", comment_suffix(.error_comment))]
    DimseFailure {
        /// DIMSE status code
        status: u16,
        /// Error Comment (0000,0902) sent with the status, if any
        error_comment: Option<String>,
    },

    /// Invalid client configuration
    ///
    /// # Example
    /// ```no_run
    /// # use dicomtools_rust::error::DicomError;
    /// let err = DicomError::InvalidConfig("AE title must be 1-16 characters".to_string());
    /// ```
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error on an already established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DicomError {
    /// Returns `false` for errors that leave already obtained results usable
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DicomError::ReleaseTimeout | DicomError::UnparsableDateTime(_)
        )
    }

    /// Returns `true` if this error was caused by the external deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, DicomError::Timeout { .. })
    }

    pub(crate) fn connection(message: impl Into<String>, source: std::io::Error) -> Self {
        DicomError::ConnectionError {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        DicomError::ProtocolViolation(message.into())
    }
}

fn comment_suffix(comment: &Option<String>) -> String {
    comment
        .as_deref()
        .map(|c| format!(": {}", c))
        .unwrap_or_default()
}

/// Result type alias for DICOM network operations
pub type Result<T> = std::result::Result<T, DicomError>;
