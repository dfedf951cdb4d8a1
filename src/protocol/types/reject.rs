//! A-ASSOCIATE-RJ PDU

use crate::error::{DicomError, Result};
use crate::protocol::header::PduType;
use crate::protocol::message::PduBody;
use std::fmt;

/// Whether the rejection is permanent or transient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectResult {
    Permanent,
    Transient,
}

/// Reasons given by the service user (source 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAeTitleNotRecognized,
    CalledAeTitleNotRecognized,
    Reserved(u8),
}

/// Reasons given by the ACSE service provider (source 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcseProviderReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
    Reserved(u8),
}

/// Reasons given by the presentation service provider (source 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationProviderReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

/// Source of the rejection together with its reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectSource {
    ServiceUser(ServiceUserReason),
    AcseProvider(AcseProviderReason),
    PresentationProvider(PresentationProviderReason),
}

impl RejectSource {
    fn from_bytes(source: u8, reason: u8) -> Result<Self> {
        match source {
            1 => Ok(RejectSource::ServiceUser(match reason {
                1 => ServiceUserReason::NoReasonGiven,
                2 => ServiceUserReason::ApplicationContextNameNotSupported,
                3 => ServiceUserReason::CallingAeTitleNotRecognized,
                7 => ServiceUserReason::CalledAeTitleNotRecognized,
                other => ServiceUserReason::Reserved(other),
            })),
            2 => Ok(RejectSource::AcseProvider(match reason {
                1 => AcseProviderReason::NoReasonGiven,
                2 => AcseProviderReason::ProtocolVersionNotSupported,
                other => AcseProviderReason::Reserved(other),
            })),
            3 => Ok(RejectSource::PresentationProvider(match reason {
                1 => PresentationProviderReason::TemporaryCongestion,
                2 => PresentationProviderReason::LocalLimitExceeded,
                other => PresentationProviderReason::Reserved(other),
            })),
            other => Err(DicomError::violation(format!(
                "Invalid A-ASSOCIATE-RJ source {}",
                other
            ))),
        }
    }

    fn to_bytes(self) -> (u8, u8) {
        match self {
            RejectSource::ServiceUser(reason) => (
                1,
                match reason {
                    ServiceUserReason::NoReasonGiven => 1,
                    ServiceUserReason::ApplicationContextNameNotSupported => 2,
                    ServiceUserReason::CallingAeTitleNotRecognized => 3,
                    ServiceUserReason::CalledAeTitleNotRecognized => 7,
                    ServiceUserReason::Reserved(code) => code,
                },
            ),
            RejectSource::AcseProvider(reason) => (
                2,
                match reason {
                    AcseProviderReason::NoReasonGiven => 1,
                    AcseProviderReason::ProtocolVersionNotSupported => 2,
                    AcseProviderReason::Reserved(code) => code,
                },
            ),
            RejectSource::PresentationProvider(reason) => (
                3,
                match reason {
                    PresentationProviderReason::TemporaryCongestion => 1,
                    PresentationProviderReason::LocalLimitExceeded => 2,
                    PresentationProviderReason::Reserved(code) => code,
                },
            ),
        }
    }
}

/// A-ASSOCIATE-RJ PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociateRj {
    pub result: RejectResult,
    pub source: RejectSource,
}

impl fmt::Display for AssociateRj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.result {
            RejectResult::Permanent => f.write_str("permanent rejection")?,
            RejectResult::Transient => f.write_str("transient rejection")?,
        }
        match self.source {
            RejectSource::ServiceUser(reason) => {
                f.write_str(" by service user: ")?;
                match reason {
                    ServiceUserReason::NoReasonGiven => f.write_str("no reason given"),
                    ServiceUserReason::ApplicationContextNameNotSupported => {
                        f.write_str("application context name not supported")
                    }
                    ServiceUserReason::CallingAeTitleNotRecognized => {
                        f.write_str("calling AE title not recognized")
                    }
                    ServiceUserReason::CalledAeTitleNotRecognized => {
                        f.write_str("called AE title not recognized")
                    }
                    ServiceUserReason::Reserved(code) => write!(f, "reserved reason {}", code),
                }
            }
            RejectSource::AcseProvider(reason) => {
                f.write_str(" by ACSE service provider: ")?;
                match reason {
                    AcseProviderReason::NoReasonGiven => f.write_str("no reason given"),
                    AcseProviderReason::ProtocolVersionNotSupported => {
                        f.write_str("protocol version not supported")
                    }
                    AcseProviderReason::Reserved(code) => write!(f, "reserved reason {}", code),
                }
            }
            RejectSource::PresentationProvider(reason) => {
                f.write_str(" by presentation service provider: ")?;
                match reason {
                    PresentationProviderReason::TemporaryCongestion => {
                        f.write_str("temporary congestion")
                    }
                    PresentationProviderReason::LocalLimitExceeded => {
                        f.write_str("local limit exceeded")
                    }
                    PresentationProviderReason::Reserved(code) => {
                        write!(f, "reserved reason {}", code)
                    }
                }
            }
        }
    }
}

impl PduBody for AssociateRj {
    fn pdu_type() -> PduType {
        PduType::AssociateRj
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        let result = match self.result {
            RejectResult::Permanent => 1,
            RejectResult::Transient => 2,
        };
        let (source, reason) = self.source.to_bytes();
        Ok(vec![0, result, source, reason])
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        if data.len() != 4 {
            return Err(DicomError::violation(format!(
                "A-ASSOCIATE-RJ body must be 4 bytes, got {}",
                data.len()
            )));
        }
        let result = match data[1] {
            1 => RejectResult::Permanent,
            2 => RejectResult::Transient,
            other => {
                return Err(DicomError::violation(format!(
                    "Invalid A-ASSOCIATE-RJ result {}",
                    other
                )))
            }
        };
        let source = RejectSource::from_bytes(data[2], data[3])?;
        Ok(AssociateRj { result, source })
    }
}
