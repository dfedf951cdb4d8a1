//! Client configuration
//!
//! All fields have defaults, so a TOML file only needs to name what differs:
//!
//! ```toml
//! host = "pacs.example.org"
//! port = 11112
//! called_ae = "PACS"
//! timeout_ms = 30000
//!
//! [tls]
//! enabled = true
//! ca_file = "/etc/dicom/ca.pem"
//! ```

use crate::error::{DicomError, Result};
use crate::io::dispatcher::QueueConfig;
use crate::io::tls::TlsOptions;
use crate::protocol::header::AeTitle;
use crate::protocol::uid::{DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 104;
pub const DEFAULT_CALLING_AE: &str = "DICOMTOOLS-SCU";
pub const DEFAULT_CALLED_AE: &str = "ANY-SCP";
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_ECHO_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 5_000;
/// Largest accepted timeout
pub const MAX_TIMEOUT_MS: u64 = 60_000;

/// Connection and behaviour settings of a [`DicomClient`](crate::client::DicomClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name or IP address of the remote AE
    pub host: String,
    pub port: u16,
    pub calling_ae: String,
    pub called_ae: String,
    /// Deadline for a whole C-FIND exchange
    pub timeout_ms: u64,
    /// Deadline for a whole C-ECHO exchange
    pub echo_timeout_ms: u64,
    /// Time to wait for A-RELEASE-RP
    pub release_timeout_ms: u64,
    /// Largest P-DATA-TF PDU we accept (0 = unlimited)
    pub max_pdu_length: u32,
    pub tls: TlsOptions,
    /// Buffer at most this many responses per request (unbounded if unset)
    pub response_queue_capacity: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            calling_ae: DEFAULT_CALLING_AE.to_string(),
            called_ae: DEFAULT_CALLED_AE.to_string(),
            timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            echo_timeout_ms: DEFAULT_ECHO_TIMEOUT_MS,
            release_timeout_ms: DEFAULT_RELEASE_TIMEOUT_MS,
            max_pdu_length: DEFAULT_MAX_PDU,
            tls: TlsOptions::default(),
            response_queue_capacity: None,
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(text)
            .map_err(|e| DicomError::InvalidConfig(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DicomError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every field; called by `DicomClient::new`
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DicomError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(DicomError::InvalidConfig("port must not be 0".to_string()));
        }
        AeTitle::new(&self.calling_ae)?;
        AeTitle::new(&self.called_ae)?;

        for (name, value) in [
            ("timeout_ms", self.timeout_ms),
            ("echo_timeout_ms", self.echo_timeout_ms),
            ("release_timeout_ms", self.release_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(DicomError::InvalidConfig(format!(
                    "{} must be within 1..={} (got {})",
                    name, MAX_TIMEOUT_MS, value
                )));
            }
        }

        if self.max_pdu_length != 0
            && !(MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&self.max_pdu_length)
        {
            return Err(DicomError::InvalidConfig(format!(
                "max_pdu_length must be 0 or within {}..={} (got {})",
                MINIMUM_PDU_SIZE, MAXIMUM_PDU_SIZE, self.max_pdu_length
            )));
        }
        if self.response_queue_capacity == Some(0) {
            return Err(DicomError::InvalidConfig(
                "response_queue_capacity must be at least 1".to_string(),
            ));
        }
        self.tls.validate()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    pub fn queue(&self) -> QueueConfig {
        match self.response_queue_capacity {
            Some(capacity) => QueueConfig::bounded(capacity),
            None => QueueConfig::unbounded(),
        }
    }
}
