//! TLS client configuration
//!
//! Builds a `rustls::ClientConfig` from [`TlsOptions`]: system root
//! certificates by default, an optional CA bundle, and an optional client
//! certificate/key pair for mutual authentication.

use crate::error::{DicomError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::rustls;
use tracing::{debug, warn};

/// TLS settings of a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Wrap the TCP connection in TLS
    pub enabled: bool,
    /// PEM bundle of trusted CA certificates, used instead of the system roots
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate chain for mutual TLS
    pub cert_file: Option<PathBuf>,
    /// PEM private key matching `cert_file`
    pub key_file: Option<PathBuf>,
    /// Name checked against the server certificate (defaults to the host)
    pub server_name: Option<String>,
    /// Skip server certificate verification (testing only)
    pub insecure: bool,
}

impl TlsOptions {
    /// Plain TLS with system roots
    pub fn enabled() -> Self {
        TlsOptions {
            enabled: true,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(DicomError::InvalidConfig(
                "TLS client certificate and key must be given together".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the rustls client configuration
    pub fn client_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        self.validate()?;
        if self.insecure {
            warn!("TLS server certificate verification disabled");
            return Ok(Arc::new(insecure_tls_config()));
        }

        let mut root_store = rustls::RootCertStore::empty();
        match &self.ca_file {
            Some(path) => {
                for cert in load_certs(path)? {
                    root_store.add(cert).map_err(|e| invalid_data(format!(
                        "Failed to add CA certificate from {}: {}",
                        path.display(),
                        e
                    )))?;
                }
            }
            None => {
                let native_certs = rustls_native_certs::load_native_certs();
                for cert in native_certs.certs {
                    root_store.add(cert).map_err(|e| {
                        invalid_data(format!("Failed to add root certificate: {}", e))
                    })?;
                }
                if !native_certs.errors.is_empty() {
                    warn!(
                        error_count = native_certs.errors.len(),
                        "Some native certificates failed to load"
                    );
                }
            }
        }
        debug!(roots = root_store.len(), "TLS trust anchors loaded");

        let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);
        let config = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                .map_err(|e| invalid_data(format!("Invalid client certificate: {}", e)))?,
            _ => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

fn invalid_data(message: String) -> DicomError {
    DicomError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

fn open(path: &Path, what: &str) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        DicomError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {} file {}: {}", what, path.display(), e),
        ))
    })?;
    Ok(BufReader::new(file))
}

/// Load all certificates from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid_data(format!("Failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(invalid_data(format!(
            "No certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path, "key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| invalid_data(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| invalid_data(format!("No private key found in {}", path.display())))
}

/// Client configuration that accepts any server certificate
///
/// Only meant for test systems with self-signed certificates.
pub fn insecure_tls_config() -> rustls::ClientConfig {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{ServerName, UnixTime};

    #[derive(Debug)]
    struct AcceptAnyCertificate;

    impl ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            use rustls::SignatureScheme;
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ED25519,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
            ]
        }
    }

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth()
}
