//! P-DATA-TF PDU
//!
//! Carries one or more presentation data values (PDVs). Each PDV item is a
//! 4-byte length, the presentation context ID, a message control header and
//! the fragment bytes.

use crate::error::{DicomError, Result};
use crate::protocol::header::PduType;
use crate::protocol::message::PduBody;
use bytes::BufMut;

/// Overhead of one PDV item in front of its fragment bytes
pub const PDV_HEADER_SIZE: usize = 6;

/// Whether a PDV carries command or data set bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PDataValueType {
    Command,
    Data,
}

/// One fragment of a DIMSE command set or data set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    /// Last fragment of the command or data set
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl PDataValue {
    fn control_header(&self) -> u8 {
        let mut header = 0u8;
        if self.value_type == PDataValueType::Command {
            header |= 0x01;
        }
        if self.is_last {
            header |= 0x02;
        }
        header
    }
}

/// P-DATA-TF PDU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PData {
    pub values: Vec<PDataValue>,
}

impl PduBody for PData {
    fn pdu_type() -> PduType {
        PduType::PData
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        let size = self
            .values
            .iter()
            .map(|v| PDV_HEADER_SIZE + v.data.len())
            .sum();
        let mut buf = Vec::with_capacity(size);
        for value in &self.values {
            let item_length = u32::try_from(value.data.len() + 2).map_err(|_| {
                DicomError::violation(format!("PDV too large: {} bytes", value.data.len()))
            })?;
            buf.put_u32(item_length);
            buf.put_u8(value.presentation_context_id);
            buf.put_u8(value.control_header());
            buf.extend_from_slice(&value.data);
        }
        Ok(buf)
    }

    fn decode_body(mut data: &[u8]) -> Result<Self> {
        let mut values = Vec::new();
        while !data.is_empty() {
            if data.len() < PDV_HEADER_SIZE {
                return Err(DicomError::violation(format!(
                    "Truncated PDV item header ({} bytes)",
                    data.len()
                )));
            }
            let item_length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if item_length < 2 {
                return Err(DicomError::violation(format!(
                    "PDV item length {} is below the minimum of 2",
                    item_length
                )));
            }
            if data.len() < 4 + item_length {
                return Err(DicomError::violation(format!(
                    "PDV item declares {} bytes but only {} remain",
                    item_length,
                    data.len() - 4
                )));
            }
            let control = data[5];
            values.push(PDataValue {
                presentation_context_id: data[4],
                value_type: if control & 0x01 != 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                },
                is_last: control & 0x02 != 0,
                data: data[PDV_HEADER_SIZE..4 + item_length].to_vec(),
            });
            data = &data[4 + item_length..];
        }
        if values.is_empty() {
            return Err(DicomError::violation("P-DATA-TF without any PDV item"));
        }
        Ok(PData { values })
    }
}
