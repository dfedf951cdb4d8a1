//! Streaming PDU reader
//!
//! Accumulates bytes from an async reader and yields whole PDUs. The size of
//! each incoming PDU is checked against the header before its body is
//! buffered, so a hostile peer cannot make us allocate arbitrary amounts.

use crate::error::{DicomError, Result};
use crate::protocol::header::{PduHeader, PduType};
use crate::protocol::message::{Decoded, Pdu};
use crate::protocol::uid::MAXIMUM_PDU_SIZE;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

/// Upper bound for PDUs other than P-DATA-TF
pub const MAX_CONTROL_PDU_SIZE: u32 = MAXIMUM_PDU_SIZE;

const READ_CHUNK: usize = 8 * 1024;

/// Incremental PDU decoder
#[derive(Debug)]
pub struct PduReader {
    buffer: BytesMut,
    /// Largest P-DATA-TF body accepted (0 = unlimited)
    max_pdu_length: u32,
}

impl PduReader {
    /// Create a reader enforcing the locally advertised maximum PDU length
    pub fn new(max_pdu_length: u32) -> Self {
        PduReader {
            buffer: BytesMut::with_capacity(READ_CHUNK),
            max_pdu_length,
        }
    }

    /// Number of buffered bytes not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append raw bytes received from the peer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn check_size(&self, header: &PduHeader) -> Result<()> {
        let limit = match header.pdu_type {
            PduType::PData if self.max_pdu_length == 0 => return Ok(()),
            PduType::PData => self.max_pdu_length,
            _ => MAX_CONTROL_PDU_SIZE,
        };
        if header.length > limit {
            return Err(DicomError::violation(format!(
                "{} of {} bytes exceeds the limit of {} bytes",
                header.pdu_type, header.length, limit
            )));
        }
        Ok(())
    }

    /// Decode the next PDU from the buffered bytes, if one is complete
    pub fn next_pdu(&mut self) -> Result<Option<Pdu>> {
        if self.buffer.len() < PduHeader::SIZE {
            return Ok(None);
        }
        let header = PduHeader::decode(&self.buffer)?;
        self.check_size(&header)?;

        match Pdu::decode(&self.buffer)? {
            Decoded::Complete { pdu, consumed } => {
                self.buffer.advance(consumed);
                debug!(
                    pdu_type = %pdu.pdu_type(),
                    size = consumed,
                    "PDU received"
                );
                Ok(Some(pdu))
            }
            Decoded::NeedMoreData => {
                self.buffer.reserve(header.total_size() - self.buffer.len());
                Ok(None)
            }
        }
    }

    /// Read from `reader` until a whole PDU is available
    ///
    /// # Returns
    /// `Ok(None)` when the peer closed the connection at a PDU boundary,
    /// `IncompleteMessage` when it closed in the middle of a PDU.
    pub async fn read_pdu<R>(&mut self, reader: &mut R) -> Result<Option<Pdu>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(pdu) = self.next_pdu()? {
                return Ok(Some(pdu));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    debug!("Peer closed the connection");
                    return Ok(None);
                }
                return Err(DicomError::IncompleteMessage(format!(
                    "Connection closed with {} bytes of an unfinished PDU",
                    self.buffer.len()
                )));
            }
            trace!(bytes = n, "Read from transport");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
