//! A-ABORT PDU

use crate::error::{DicomError, Result};
use crate::protocol::header::PduType;
use crate::protocol::message::PduBody;
use std::fmt;

/// Provider abort reasons (only significant when the source is the service provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameterValue,
    Reserved(u8),
}

impl AbortReason {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AbortReason::NotSpecified,
            1 => AbortReason::UnrecognizedPdu,
            2 => AbortReason::UnexpectedPdu,
            4 => AbortReason::UnrecognizedPduParameter,
            5 => AbortReason::UnexpectedPduParameter,
            6 => AbortReason::InvalidPduParameterValue,
            other => AbortReason::Reserved(other),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AbortReason::NotSpecified => 0,
            AbortReason::UnrecognizedPdu => 1,
            AbortReason::UnexpectedPdu => 2,
            AbortReason::UnrecognizedPduParameter => 4,
            AbortReason::UnexpectedPduParameter => 5,
            AbortReason::InvalidPduParameterValue => 6,
            AbortReason::Reserved(code) => code,
        }
    }
}

/// Who initiated the abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortSource {
    ServiceUser,
    Reserved,
    ServiceProvider(AbortReason),
}

/// A-ABORT PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort {
    pub source: AbortSource,
}

impl Abort {
    /// Abort initiated by this application
    pub fn user() -> Self {
        Abort {
            source: AbortSource::ServiceUser,
        }
    }

    /// Abort raised by the protocol machine for a malformed or unexpected PDU
    pub fn provider(reason: AbortReason) -> Self {
        Abort {
            source: AbortSource::ServiceProvider(reason),
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            AbortSource::ServiceUser => f.write_str("aborted by service user"),
            AbortSource::Reserved => f.write_str("aborted (reserved source)"),
            AbortSource::ServiceProvider(reason) => {
                write!(f, "aborted by service provider: {:?}", reason)
            }
        }
    }
}

impl PduBody for Abort {
    fn pdu_type() -> PduType {
        PduType::Abort
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        let (source, reason) = match self.source {
            AbortSource::ServiceUser => (0, 0),
            AbortSource::Reserved => (1, 0),
            AbortSource::ServiceProvider(reason) => (2, reason.as_u8()),
        };
        Ok(vec![0, 0, source, reason])
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        if data.len() != 4 {
            return Err(DicomError::violation(format!(
                "A-ABORT body must be 4 bytes, got {}",
                data.len()
            )));
        }
        let source = match data[2] {
            0 => AbortSource::ServiceUser,
            1 => AbortSource::Reserved,
            2 => AbortSource::ServiceProvider(AbortReason::from_u8(data[3])),
            other => {
                return Err(DicomError::violation(format!(
                    "Invalid A-ABORT source {}",
                    other
                )))
            }
        };
        Ok(Abort { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_user_encoding() {
        assert_eq!(Abort::user().encode_body().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_abort_provider_roundtrip() {
        let abort = Abort::provider(AbortReason::UnexpectedPdu);
        let body = abort.encode_body().unwrap();
        assert_eq!(body, vec![0, 0, 2, 2]);
        assert_eq!(Abort::decode_body(&body).unwrap(), abort);
    }

    #[test]
    fn test_abort_invalid_source() {
        let result = Abort::decode_body(&[0, 0, 7, 0]);
        assert!(matches!(result, Err(DicomError::ProtocolViolation(_))));
    }
}
