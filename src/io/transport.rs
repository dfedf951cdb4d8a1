//! Plain TCP or TLS byte stream to the remote Application Entity

use crate::error::{DicomError, Result};
use rustls::pki_types::ServerName;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{rustls, TlsConnector};
use tracing::{info, warn};

/// Byte stream carrying the upper layer PDUs
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Open a TCP connection, optionally followed by a TLS handshake
    ///
    /// # Errors
    /// - [`DicomError::ConnectionError`] when the connection is refused, the
    ///   host cannot be resolved or the TLS handshake fails
    pub async fn connect(
        host: &str,
        port: u16,
        tls: Option<(Arc<rustls::ClientConfig>, String)>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        info!(addr = %addr, tls = tls.is_some(), "Connecting to remote AE");

        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| DicomError::connection(addr.clone(), e))?;
        tcp_stream
            .set_nodelay(true)
            .map_err(|e| DicomError::connection(addr.clone(), e))?;
        let local_addr = tcp_stream
            .local_addr()
            .map_err(|e| DicomError::connection(addr.clone(), e))?;

        let Some((config, server_name)) = tls else {
            info!(local_addr = %local_addr, remote_addr = %addr, "TCP connection established");
            return Ok(Transport::Plain(tcp_stream));
        };

        let server_name = ServerName::try_from(server_name).map_err(|e| {
            DicomError::connection(
                addr.clone(),
                io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid hostname: {}", e)),
            )
        })?;

        let connector = TlsConnector::from(config);
        let stream = connector.connect(server_name, tcp_stream).await.map_err(|e| {
            warn!(error = %e, "TLS handshake failed");
            DicomError::connection(
                format!("TLS handshake with {}", addr),
                io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()),
            )
        })?;

        info!(local_addr = %local_addr, remote_addr = %addr, "TLS connection established");
        Ok(Transport::Tls(Box::new(stream)))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
