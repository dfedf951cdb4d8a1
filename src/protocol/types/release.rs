//! A-RELEASE-RQ and A-RELEASE-RP PDUs (4 reserved bytes each)

use crate::error::{DicomError, Result};
use crate::protocol::header::PduType;
use crate::protocol::message::PduBody;

/// A-RELEASE-RQ PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseRq;

/// A-RELEASE-RP PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseRp;

fn check_reserved(data: &[u8], pdu: PduType) -> Result<()> {
    if data.len() != 4 {
        return Err(DicomError::violation(format!(
            "{} body must be 4 bytes, got {}",
            pdu,
            data.len()
        )));
    }
    Ok(())
}

impl PduBody for ReleaseRq {
    fn pdu_type() -> PduType {
        PduType::ReleaseRq
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        Ok(vec![0; 4])
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        check_reserved(data, PduType::ReleaseRq)?;
        Ok(ReleaseRq)
    }
}

impl PduBody for ReleaseRp {
    fn pdu_type() -> PduType {
        PduType::ReleaseRp
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        Ok(vec![0; 4])
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        check_reserved(data, PduType::ReleaseRp)?;
        Ok(ReleaseRp)
    }
}
