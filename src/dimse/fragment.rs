//! Fragmentation of DIMSE messages into P-DATA-TF PDUs and reassembly
//!
//! Each fragment travels in its own P-DATA-TF PDU with a single PDV. The
//! command set is sent first, then the data set, each with its own
//! last-fragment flag.

use crate::dimse::command::CommandSet;
use crate::error::{DicomError, Result};
use crate::protocol::types::pdata::PDV_HEADER_SIZE;
use crate::protocol::types::{PData, PDataValue, PDataValueType};
use std::collections::HashMap;
use tracing::trace;

/// Fragment size used when the peer announced no limit (max length 0)
const UNLIMITED_FRAGMENT_SIZE: usize = 64 * 1024;

/// Largest command set plus data set accepted on one presentation context
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// A complete DIMSE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimseMessage {
    pub presentation_context_id: u8,
    pub command: CommandSet,
    /// Encoded data set, in the transfer syntax of the presentation context
    pub data: Option<Vec<u8>>,
}

/// Largest PDV payload fitting in a PDU of `max_pdu_length`
pub fn fragment_payload_size(max_pdu_length: u32) -> usize {
    if max_pdu_length == 0 {
        UNLIMITED_FRAGMENT_SIZE
    } else {
        (max_pdu_length as usize).saturating_sub(PDV_HEADER_SIZE).max(1)
    }
}

fn split(
    out: &mut Vec<PData>,
    presentation_context_id: u8,
    value_type: PDataValueType,
    bytes: &[u8],
    payload: usize,
) {
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(payload).collect()
    };
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        out.push(PData {
            values: vec![PDataValue {
                presentation_context_id,
                value_type,
                is_last: i == last,
                data: chunk.to_vec(),
            }],
        });
    }
}

/// Split an encoded command set and optional data set into P-DATA-TF PDUs
///
/// No PDU body exceeds `max_pdu_length` (the peer's announced maximum).
pub fn fragment(
    presentation_context_id: u8,
    command: &[u8],
    data: Option<&[u8]>,
    max_pdu_length: u32,
) -> Vec<PData> {
    let payload = fragment_payload_size(max_pdu_length);
    let mut out = Vec::new();
    split(
        &mut out,
        presentation_context_id,
        PDataValueType::Command,
        command,
        payload,
    );
    if let Some(data) = data {
        split(
            &mut out,
            presentation_context_id,
            PDataValueType::Data,
            data,
            payload,
        );
    }
    trace!(
        presentation_context_id,
        fragments = out.len(),
        payload,
        "DIMSE message fragmented"
    );
    out
}

#[derive(Debug, Default)]
struct Partial {
    command_bytes: Vec<u8>,
    command: Option<CommandSet>,
    data: Vec<u8>,
}

impl Partial {
    fn size(&self) -> usize {
        self.command_bytes.len() + self.data.len()
    }
}

/// Reassembles PDVs into DIMSE messages, one partial message per context ID
#[derive(Debug)]
pub struct Reassembler {
    partial: HashMap<u8, Partial>,
    max_message_size: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::with_limit(MAX_MESSAGE_SIZE)
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembler rejecting messages larger than `max_message_size` bytes
    pub fn with_limit(max_message_size: usize) -> Self {
        Self {
            partial: HashMap::new(),
            max_message_size,
        }
    }

    /// Feed one PDV; returns a message once both command and data set are complete
    pub fn push(&mut self, pdv: PDataValue) -> Result<Option<DimseMessage>> {
        let pc_id = pdv.presentation_context_id;
        let partial = self.partial.entry(pc_id).or_default();
        if partial.size().saturating_add(pdv.data.len()) > self.max_message_size {
            self.partial.remove(&pc_id);
            return Err(DicomError::violation(format!(
                "DIMSE message on context {} exceeds {} bytes",
                pc_id, self.max_message_size
            )));
        }

        match pdv.value_type {
            PDataValueType::Command => {
                if partial.command.is_some() {
                    return Err(DicomError::violation(format!(
                        "Command fragment after a complete command set on context {}",
                        pc_id
                    )));
                }
                partial.command_bytes.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }
                let command = CommandSet::decode(&partial.command_bytes)?;
                if !command.has_data_set {
                    self.partial.remove(&pc_id);
                    return Ok(Some(DimseMessage {
                        presentation_context_id: pc_id,
                        command,
                        data: None,
                    }));
                }
                partial.command = Some(command);
                Ok(None)
            }
            PDataValueType::Data => {
                if partial.command.is_none() {
                    return Err(DicomError::violation(format!(
                        "Data fragment before a complete command set on context {}",
                        pc_id
                    )));
                }
                partial.data.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }
                let done = self.partial.remove(&pc_id).unwrap_or_default();
                match done.command {
                    Some(command) => Ok(Some(DimseMessage {
                        presentation_context_id: pc_id,
                        command,
                        data: Some(done.data),
                    })),
                    None => Err(DicomError::violation("Reassembly state lost")),
                }
            }
        }
    }

    /// True when some message has been started but not completed
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Check that nothing is left half-received (called when the connection closes)
    pub fn finish(&self) -> Result<()> {
        if let Some(pc_id) = self.partial.keys().next() {
            return Err(DicomError::IncompleteMessage(format!(
                "Connection closed during a DIMSE message on context {}",
                pc_id
            )));
        }
        Ok(())
    }
}
