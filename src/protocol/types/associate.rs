//! A-ASSOCIATE-RQ and A-ASSOCIATE-AC PDUs
//!
//! Both PDUs share the same fixed part (protocol version, called and calling
//! AE titles, reserved space) followed by variable items: the application
//! context, one item per presentation context and the user information item.

use super::{item_text, parse_items, put_item};
use crate::error::{DicomError, Result};
use crate::protocol::header::{AeTitle, PduType};
use crate::protocol::message::PduBody;
use crate::protocol::uid;
use bytes::{Buf, BufMut};

const ITEM_APPLICATION_CONTEXT: u8 = 0x10;
const ITEM_PRESENTATION_CONTEXT_RQ: u8 = 0x20;
const ITEM_PRESENTATION_CONTEXT_AC: u8 = 0x21;
const ITEM_ABSTRACT_SYNTAX: u8 = 0x30;
const ITEM_TRANSFER_SYNTAX: u8 = 0x40;
const ITEM_USER_INFORMATION: u8 = 0x50;

const SUB_ITEM_MAX_LENGTH: u8 = 0x51;
const SUB_ITEM_IMPLEMENTATION_CLASS_UID: u8 = 0x52;
const SUB_ITEM_ASYNC_OPERATIONS_WINDOW: u8 = 0x53;
const SUB_ITEM_IMPLEMENTATION_VERSION_NAME: u8 = 0x55;

/// Size of the fixed part preceding the variable items
const FIXED_PART_SIZE: usize = 68;

/// Presentation context proposed by the requestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextProposed {
    /// Odd context ID in 1..=255
    pub id: u8,
    /// Abstract syntax (SOP class) UID
    pub abstract_syntax: String,
    /// Candidate transfer syntax UIDs, in order of preference
    pub transfer_syntaxes: Vec<String>,
}

/// Result/reason field of a presentation context in A-ASSOCIATE-AC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

impl PresentationContextResultReason {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Acceptance),
            1 => Ok(Self::UserRejection),
            2 => Ok(Self::NoReason),
            3 => Ok(Self::AbstractSyntaxNotSupported),
            4 => Ok(Self::TransferSyntaxesNotSupported),
            other => Err(DicomError::violation(format!(
                "Invalid presentation context result {}",
                other
            ))),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Acceptance => 0,
            Self::UserRejection => 1,
            Self::NoReason => 2,
            Self::AbstractSyntaxNotSupported => 3,
            Self::TransferSyntaxesNotSupported => 4,
        }
    }
}

/// Presentation context as answered by the acceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    /// Accepted transfer syntax; not significant unless accepted
    pub transfer_syntax: String,
}

impl PresentationContextResult {
    pub fn is_accepted(&self) -> bool {
        self.reason == PresentationContextResultReason::Acceptance
    }
}

/// Sub-items of the user information item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserVariableItem {
    /// Maximum length of P-DATA-TF PDUs the sender can receive (0 = unlimited)
    MaxLength(u32),
    ImplementationClassUid(String),
    ImplementationVersionName(String),
    /// Maximum number of outstanding operations invoked/performed
    AsyncOperationsWindow { invoked: u16, performed: u16 },
    /// Any other sub-item, kept as raw bytes
    Unknown { item_type: u8, data: Vec<u8> },
}

/// A-ASSOCIATE-RQ PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateRq {
    pub protocol_version: u16,
    pub calling_ae: AeTitle,
    pub called_ae: AeTitle,
    pub application_context: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

/// A-ASSOCIATE-AC PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociateAc {
    pub protocol_version: u16,
    /// Echo of the requestor's calling AE title (not tested by receivers)
    pub calling_ae: AeTitle,
    /// Echo of the requestor's called AE title (not tested by receivers)
    pub called_ae: AeTitle,
    pub application_context: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

impl AssociateAc {
    /// Maximum PDU length announced by the acceptor, if present
    pub fn max_pdu_length(&self) -> Option<u32> {
        max_length_of(&self.user_variables)
    }
}

impl AssociateRq {
    /// Maximum PDU length announced by the requestor, if present
    pub fn max_pdu_length(&self) -> Option<u32> {
        max_length_of(&self.user_variables)
    }
}

fn max_length_of(items: &[UserVariableItem]) -> Option<u32> {
    items.iter().find_map(|item| match item {
        UserVariableItem::MaxLength(len) => Some(*len),
        _ => None,
    })
}

fn encode_fixed_part(buf: &mut Vec<u8>, version: u16, called: &AeTitle, calling: &AeTitle) {
    buf.put_u16(version);
    buf.put_u16(0);
    buf.put_slice(called.as_bytes());
    buf.put_slice(calling.as_bytes());
    buf.put_bytes(0, 32);
}

fn decode_fixed_part(data: &[u8], pdu: PduType) -> Result<(u16, AeTitle, AeTitle)> {
    if data.len() < FIXED_PART_SIZE {
        return Err(DicomError::violation(format!(
            "{} body too short: {} bytes (min: {})",
            pdu,
            data.len(),
            FIXED_PART_SIZE
        )));
    }
    let mut cursor = std::io::Cursor::new(data);
    let version = cursor.get_u16();
    cursor.advance(2);
    let mut called = [0u8; 16];
    cursor.copy_to_slice(&mut called);
    let mut calling = [0u8; 16];
    cursor.copy_to_slice(&mut calling);
    Ok((version, AeTitle::from(called), AeTitle::from(calling)))
}

fn encode_user_information(buf: &mut Vec<u8>, items: &[UserVariableItem]) -> Result<()> {
    let mut body = Vec::new();
    for item in items {
        match item {
            UserVariableItem::MaxLength(len) => {
                put_item(&mut body, SUB_ITEM_MAX_LENGTH, &len.to_be_bytes())?
            }
            UserVariableItem::ImplementationClassUid(uid) => {
                put_item(&mut body, SUB_ITEM_IMPLEMENTATION_CLASS_UID, uid.as_bytes())?
            }
            UserVariableItem::ImplementationVersionName(name) => {
                put_item(&mut body, SUB_ITEM_IMPLEMENTATION_VERSION_NAME, name.as_bytes())?
            }
            UserVariableItem::AsyncOperationsWindow { invoked, performed } => {
                let mut window = Vec::with_capacity(4);
                window.put_u16(*invoked);
                window.put_u16(*performed);
                put_item(&mut body, SUB_ITEM_ASYNC_OPERATIONS_WINDOW, &window)?
            }
            UserVariableItem::Unknown { item_type, data } => put_item(&mut body, *item_type, data)?,
        }
    }
    put_item(buf, ITEM_USER_INFORMATION, &body)
}

fn decode_user_information(data: &[u8]) -> Result<Vec<UserVariableItem>> {
    parse_items(data, "user information")?
        .into_iter()
        .map(|item| match item.item_type {
            SUB_ITEM_MAX_LENGTH => {
                if item.data.len() != 4 {
                    return Err(DicomError::violation(format!(
                        "Maximum length sub-item must be 4 bytes, got {}",
                        item.data.len()
                    )));
                }
                Ok(UserVariableItem::MaxLength(u32::from_be_bytes([
                    item.data[0],
                    item.data[1],
                    item.data[2],
                    item.data[3],
                ])))
            }
            SUB_ITEM_IMPLEMENTATION_CLASS_UID => Ok(UserVariableItem::ImplementationClassUid(
                item_text(item.data),
            )),
            SUB_ITEM_IMPLEMENTATION_VERSION_NAME => Ok(
                UserVariableItem::ImplementationVersionName(item_text(item.data)),
            ),
            SUB_ITEM_ASYNC_OPERATIONS_WINDOW if item.data.len() == 4 => {
                Ok(UserVariableItem::AsyncOperationsWindow {
                    invoked: u16::from_be_bytes([item.data[0], item.data[1]]),
                    performed: u16::from_be_bytes([item.data[2], item.data[3]]),
                })
            }
            other => Ok(UserVariableItem::Unknown {
                item_type: other,
                data: item.data.to_vec(),
            }),
        })
        .collect()
}

fn decode_proposed_context(data: &[u8]) -> Result<PresentationContextProposed> {
    if data.len() < 4 {
        return Err(DicomError::violation("Truncated presentation context item"));
    }
    let id = data[0];
    let mut abstract_syntax = None;
    let mut transfer_syntaxes = Vec::new();
    for sub in parse_items(&data[4..], "presentation context")? {
        match sub.item_type {
            ITEM_ABSTRACT_SYNTAX => abstract_syntax = Some(item_text(sub.data)),
            ITEM_TRANSFER_SYNTAX => transfer_syntaxes.push(item_text(sub.data)),
            other => {
                return Err(DicomError::violation(format!(
                    "Unexpected sub-item 0x{:02X} in presentation context {}",
                    other, id
                )))
            }
        }
    }
    let abstract_syntax = abstract_syntax.ok_or_else(|| {
        DicomError::violation(format!(
            "Presentation context {} has no abstract syntax",
            id
        ))
    })?;
    if transfer_syntaxes.is_empty() {
        return Err(DicomError::violation(format!(
            "Presentation context {} has no transfer syntax",
            id
        )));
    }
    Ok(PresentationContextProposed {
        id,
        abstract_syntax,
        transfer_syntaxes,
    })
}

fn decode_context_result(data: &[u8]) -> Result<PresentationContextResult> {
    if data.len() < 4 {
        return Err(DicomError::violation("Truncated presentation context item"));
    }
    let id = data[0];
    let reason = PresentationContextResultReason::from_u8(data[2])?;
    let transfer_syntax = parse_items(&data[4..], "presentation context")?
        .into_iter()
        .find(|sub| sub.item_type == ITEM_TRANSFER_SYNTAX)
        .map(|sub| item_text(sub.data))
        .unwrap_or_default();
    Ok(PresentationContextResult {
        id,
        reason,
        transfer_syntax,
    })
}

/// Variable part shared by RQ and AC after item-specific decoding
struct Variables<C> {
    application_context: String,
    contexts: Vec<C>,
    user_variables: Vec<UserVariableItem>,
}

fn decode_variables<C>(
    data: &[u8],
    pdu: PduType,
    context_item: u8,
    decode_context: impl Fn(&[u8]) -> Result<C>,
) -> Result<Variables<C>> {
    let mut application_context = None;
    let mut contexts = Vec::new();
    let mut user_variables = Vec::new();

    for item in parse_items(&data[FIXED_PART_SIZE..], pdu.name())? {
        match item.item_type {
            ITEM_APPLICATION_CONTEXT => application_context = Some(item_text(item.data)),
            t if t == context_item => contexts.push(decode_context(item.data)?),
            ITEM_USER_INFORMATION => user_variables = decode_user_information(item.data)?,
            other => {
                return Err(DicomError::violation(format!(
                    "Unexpected item 0x{:02X} in {}",
                    other, pdu
                )))
            }
        }
    }

    let application_context = application_context.ok_or_else(|| {
        DicomError::violation(format!("{} is missing the application context", pdu))
    })?;

    Ok(Variables {
        application_context,
        contexts,
        user_variables,
    })
}

impl AssociateRq {
    /// Build a request with the standard application context
    pub fn new(
        calling_ae: AeTitle,
        called_ae: AeTitle,
        presentation_contexts: Vec<PresentationContextProposed>,
        user_variables: Vec<UserVariableItem>,
    ) -> Self {
        AssociateRq {
            protocol_version: 1,
            calling_ae,
            called_ae,
            application_context: uid::APPLICATION_CONTEXT.to_string(),
            presentation_contexts,
            user_variables,
        }
    }
}

impl PduBody for AssociateRq {
    fn pdu_type() -> PduType {
        PduType::AssociateRq
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        encode_fixed_part(&mut buf, self.protocol_version, &self.called_ae, &self.calling_ae);
        put_item(&mut buf, ITEM_APPLICATION_CONTEXT, self.application_context.as_bytes())?;

        for pc in &self.presentation_contexts {
            let mut body = vec![pc.id, 0, 0, 0];
            put_item(&mut body, ITEM_ABSTRACT_SYNTAX, pc.abstract_syntax.as_bytes())?;
            for ts in &pc.transfer_syntaxes {
                put_item(&mut body, ITEM_TRANSFER_SYNTAX, ts.as_bytes())?;
            }
            put_item(&mut buf, ITEM_PRESENTATION_CONTEXT_RQ, &body)?;
        }

        encode_user_information(&mut buf, &self.user_variables)?;
        Ok(buf)
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        let (protocol_version, called_ae, calling_ae) =
            decode_fixed_part(data, PduType::AssociateRq)?;
        let vars = decode_variables(
            data,
            PduType::AssociateRq,
            ITEM_PRESENTATION_CONTEXT_RQ,
            decode_proposed_context,
        )?;

        Ok(AssociateRq {
            protocol_version,
            calling_ae,
            called_ae,
            application_context: vars.application_context,
            presentation_contexts: vars.contexts,
            user_variables: vars.user_variables,
        })
    }
}

impl PduBody for AssociateAc {
    fn pdu_type() -> PduType {
        PduType::AssociateAc
    }

    fn encode_body(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        encode_fixed_part(&mut buf, self.protocol_version, &self.called_ae, &self.calling_ae);
        put_item(&mut buf, ITEM_APPLICATION_CONTEXT, self.application_context.as_bytes())?;

        for pc in &self.presentation_contexts {
            let mut body = vec![pc.id, 0, pc.reason.as_u8(), 0];
            put_item(&mut body, ITEM_TRANSFER_SYNTAX, pc.transfer_syntax.as_bytes())?;
            put_item(&mut buf, ITEM_PRESENTATION_CONTEXT_AC, &body)?;
        }

        encode_user_information(&mut buf, &self.user_variables)?;
        Ok(buf)
    }

    fn decode_body(data: &[u8]) -> Result<Self> {
        let (protocol_version, called_ae, calling_ae) =
            decode_fixed_part(data, PduType::AssociateAc)?;
        let vars = decode_variables(
            data,
            PduType::AssociateAc,
            ITEM_PRESENTATION_CONTEXT_AC,
            decode_context_result,
        )?;

        Ok(AssociateAc {
            protocol_version,
            calling_ae,
            called_ae,
            application_context: vars.application_context,
            presentation_contexts: vars.contexts,
            user_variables: vars.user_variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rq() -> AssociateRq {
        AssociateRq::new(
            AeTitle::new("DICOMTOOLS-SCU").unwrap(),
            AeTitle::new("ANY-SCP").unwrap(),
            vec![
                PresentationContextProposed {
                    id: 1,
                    abstract_syntax: uid::VERIFICATION.to_string(),
                    transfer_syntaxes: vec![
                        uid::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                        uid::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                    ],
                },
                PresentationContextProposed {
                    id: 3,
                    abstract_syntax: uid::STUDY_ROOT_QR_FIND.to_string(),
                    transfer_syntaxes: vec![uid::IMPLICIT_VR_LITTLE_ENDIAN.to_string()],
                },
            ],
            vec![
                UserVariableItem::MaxLength(16384),
                UserVariableItem::ImplementationClassUid(uid::IMPLEMENTATION_CLASS_UID.into()),
                UserVariableItem::AsyncOperationsWindow {
                    invoked: 1,
                    performed: 1,
                },
                UserVariableItem::ImplementationVersionName(
                    uid::IMPLEMENTATION_VERSION_NAME.into(),
                ),
            ],
        )
    }

    #[test]
    fn test_associate_rq_roundtrip() {
        let original = sample_rq();
        let body = original.encode_body().unwrap();
        let decoded = AssociateRq::decode_body(&body).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.max_pdu_length(), Some(16384));
    }

    #[test]
    fn test_associate_rq_fixed_layout() {
        let body = sample_rq().encode_body().unwrap();
        // protocol version 1
        assert_eq!(&body[0..2], &[0x00, 0x01]);
        // called AE comes first
        assert_eq!(&body[4..11], b"ANY-SCP");
        assert_eq!(&body[20..34], b"DICOMTOOLS-SCU");
        // 32 reserved bytes
        assert!(body[36..68].iter().all(|&b| b == 0));
        // application context item follows
        assert_eq!(body[68], ITEM_APPLICATION_CONTEXT);
    }

    #[test]
    fn test_associate_ac_roundtrip() {
        let original = AssociateAc {
            protocol_version: 1,
            calling_ae: AeTitle::new("DICOMTOOLS-SCU").unwrap(),
            called_ae: AeTitle::new("ANY-SCP").unwrap(),
            application_context: uid::APPLICATION_CONTEXT.to_string(),
            presentation_contexts: vec![
                PresentationContextResult {
                    id: 1,
                    reason: PresentationContextResultReason::Acceptance,
                    transfer_syntax: uid::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                },
                PresentationContextResult {
                    id: 3,
                    reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                    transfer_syntax: String::new(),
                },
            ],
            user_variables: vec![UserVariableItem::MaxLength(32768)],
        };
        let body = original.encode_body().unwrap();
        let decoded = AssociateAc::decode_body(&body).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.presentation_contexts[0].is_accepted());
        assert!(!decoded.presentation_contexts[1].is_accepted());
        assert_eq!(decoded.max_pdu_length(), Some(32768));
    }

    #[test]
    fn test_unknown_user_sub_item_preserved() {
        let mut rq = sample_rq();
        rq.user_variables.push(UserVariableItem::Unknown {
            item_type: 0x54,
            data: vec![0x00, 0x03, b'1', b'.', b'2', 0x01, 0x00],
        });
        let decoded = AssociateRq::decode_body(&rq.encode_body().unwrap()).unwrap();
        assert_eq!(decoded.user_variables, rq.user_variables);
    }

    #[test]
    fn test_missing_application_context() {
        let mut body = Vec::new();
        encode_fixed_part(
            &mut body,
            1,
            &AeTitle::new("A").unwrap(),
            &AeTitle::new("B").unwrap(),
        );
        let result = AssociateRq::decode_body(&body);
        assert!(matches!(result, Err(DicomError::ProtocolViolation(_))));
    }

    #[test]
    fn test_fixed_part_too_short() {
        let result = AssociateAc::decode_body(&[0u8; 20]);
        assert!(matches!(result, Err(DicomError::ProtocolViolation(_))));
    }
}
