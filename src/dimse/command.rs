//! DIMSE command set (group 0000)
//!
//! Always encoded in Implicit VR Little Endian, regardless of the transfer
//! syntax negotiated for the data set. CommandGroupLength is computed on
//! encode.

use crate::dimse::dataset::DataSet;
use crate::dimse::tag::tags;
use crate::error::{DicomError, Result};
use crate::protocol::uid::{self, TransferSyntax};
use bytes::BufMut;

/// CommandDataSetType value meaning "no data set follows"
pub const NO_DATA_SET: u16 = 0x0101;
/// CommandDataSetType value written when a data set follows
pub const DATA_SET_PRESENT: u16 = 0x0001;

/// DIMSE command field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandField {
    CEchoRq,
    CEchoRsp,
    CFindRq,
    CFindRsp,
    CCancelRq,
}

impl CommandField {
    pub fn as_u16(self) -> u16 {
        match self {
            CommandField::CEchoRq => 0x0030,
            CommandField::CEchoRsp => 0x8030,
            CommandField::CFindRq => 0x0020,
            CommandField::CFindRsp => 0x8020,
            CommandField::CCancelRq => 0x0FFF,
        }
    }

    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x0030 => Ok(CommandField::CEchoRq),
            0x8030 => Ok(CommandField::CEchoRsp),
            0x0020 => Ok(CommandField::CFindRq),
            0x8020 => Ok(CommandField::CFindRsp),
            0x0FFF => Ok(CommandField::CCancelRq),
            other => Err(DicomError::violation(format!(
                "Unsupported command field 0x{:04X}",
                other
            ))),
        }
    }

    pub fn is_response(self) -> bool {
        self.as_u16() & 0x8000 != 0
    }
}

/// Request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Medium,
    High,
    Low,
}

impl Priority {
    fn as_u16(self) -> u16 {
        match self {
            Priority::Medium => 0,
            Priority::High => 1,
            Priority::Low => 2,
        }
    }

    fn from_u16(value: u16) -> Self {
        match value {
            1 => Priority::High,
            2 => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Classification of a response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    Success,
    Pending,
    Cancel,
    /// Every other code, including warnings
    Failure,
}

impl StatusType {
    pub fn from_status(status: u16) -> Self {
        match status {
            0x0000 => StatusType::Success,
            0xFF00 | 0xFF01 => StatusType::Pending,
            0xFE00 => StatusType::Cancel,
            _ => StatusType::Failure,
        }
    }
}

/// Typed view of a DIMSE command set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    pub command_field: CommandField,
    pub affected_sop_class_uid: Option<String>,
    pub message_id: Option<u16>,
    pub message_id_being_responded_to: Option<u16>,
    pub priority: Option<Priority>,
    pub has_data_set: bool,
    pub status: Option<u16>,
    pub error_comment: Option<String>,
}

impl CommandSet {
    fn empty(command_field: CommandField) -> Self {
        CommandSet {
            command_field,
            affected_sop_class_uid: None,
            message_id: None,
            message_id_being_responded_to: None,
            priority: None,
            has_data_set: false,
            status: None,
            error_comment: None,
        }
    }

    /// C-ECHO-RQ for the Verification SOP class
    pub fn echo_rq(message_id: u16) -> Self {
        CommandSet {
            affected_sop_class_uid: Some(uid::VERIFICATION.to_string()),
            message_id: Some(message_id),
            ..Self::empty(CommandField::CEchoRq)
        }
    }

    /// C-FIND-RQ; the identifier travels as the data set
    pub fn find_rq(message_id: u16, sop_class_uid: &str, priority: Priority) -> Self {
        CommandSet {
            affected_sop_class_uid: Some(sop_class_uid.to_string()),
            message_id: Some(message_id),
            priority: Some(priority),
            has_data_set: true,
            ..Self::empty(CommandField::CFindRq)
        }
    }

    /// C-CANCEL-RQ for an outstanding request
    pub fn cancel_rq(message_id_being_responded_to: u16) -> Self {
        CommandSet {
            message_id_being_responded_to: Some(message_id_being_responded_to),
            ..Self::empty(CommandField::CCancelRq)
        }
    }

    /// Response to a request, as sent by a provider
    pub fn response(
        command_field: CommandField,
        sop_class_uid: &str,
        message_id_being_responded_to: u16,
        status: u16,
        has_data_set: bool,
    ) -> Self {
        CommandSet {
            affected_sop_class_uid: Some(sop_class_uid.to_string()),
            message_id_being_responded_to: Some(message_id_being_responded_to),
            status: Some(status),
            has_data_set,
            ..Self::empty(command_field)
        }
    }

    pub fn status_type(&self) -> Option<StatusType> {
        self.status.map(StatusType::from_status)
    }

    fn to_dataset(&self) -> DataSet {
        let mut ds = DataSet::new();
        if let Some(sop_class) = &self.affected_sop_class_uid {
            ds.put_str(tags::AFFECTED_SOP_CLASS_UID, sop_class);
        }
        ds.put_u16(tags::COMMAND_FIELD, self.command_field.as_u16());
        if let Some(id) = self.message_id {
            ds.put_u16(tags::MESSAGE_ID, id);
        }
        if let Some(id) = self.message_id_being_responded_to {
            ds.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, id);
        }
        if let Some(priority) = self.priority {
            ds.put_u16(tags::PRIORITY, priority.as_u16());
        }
        ds.put_u16(
            tags::COMMAND_DATA_SET_TYPE,
            if self.has_data_set {
                DATA_SET_PRESENT
            } else {
                NO_DATA_SET
            },
        );
        if let Some(status) = self.status {
            ds.put_u16(tags::STATUS, status);
        }
        if let Some(comment) = &self.error_comment {
            ds.put_str(tags::ERROR_COMMENT, comment);
        }
        ds
    }

    /// Encode in Implicit VR Little Endian with a leading group length
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = self
            .to_dataset()
            .encode(TransferSyntax::ImplicitVrLittleEndian)?;
        let group_length = u32::try_from(body.len())
            .map_err(|_| DicomError::violation("Command set too large"))?;
        let mut buf = Vec::with_capacity(12 + body.len());
        buf.put_u16_le(tags::COMMAND_GROUP_LENGTH.group());
        buf.put_u16_le(tags::COMMAND_GROUP_LENGTH.element());
        buf.put_u32_le(4);
        buf.put_u32_le(group_length);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decode a command set and check its mandatory attributes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let ds = DataSet::decode(data, TransferSyntax::ImplicitVrLittleEndian)?;
        let field = ds
            .get_u16(tags::COMMAND_FIELD)
            .ok_or_else(|| DicomError::violation("Command set without CommandField"))?;
        let command_field = CommandField::from_u16(field)?;

        let command = CommandSet {
            command_field,
            affected_sop_class_uid: ds.get_str(tags::AFFECTED_SOP_CLASS_UID),
            message_id: ds.get_u16(tags::MESSAGE_ID),
            message_id_being_responded_to: ds.get_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO),
            priority: ds.get_u16(tags::PRIORITY).map(Priority::from_u16),
            has_data_set: ds
                .get_u16(tags::COMMAND_DATA_SET_TYPE)
                .map(|t| t != NO_DATA_SET)
                .unwrap_or(false),
            status: ds.get_u16(tags::STATUS),
            error_comment: ds.get_str(tags::ERROR_COMMENT),
        };

        if command_field == CommandField::CCancelRq || command_field.is_response() {
            if command.message_id_being_responded_to.is_none() {
                return Err(DicomError::violation(format!(
                    "{:?} without MessageIDBeingRespondedTo",
                    command_field
                )));
            }
        } else if command.message_id.is_none() {
            return Err(DicomError::violation(format!(
                "{:?} without MessageID",
                command_field
            )));
        }
        if command_field.is_response() && command.status.is_none() {
            return Err(DicomError::violation(format!(
                "{:?} without Status",
                command_field
            )));
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_rq_encoding() {
        let bytes = CommandSet::echo_rq(1).encode().unwrap();
        // group length element first
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 4, 0, 0, 0]);
        let group_length = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(group_length as usize, bytes.len() - 12);

        let decoded = CommandSet::decode(&bytes).unwrap();
        assert_eq!(decoded, CommandSet::echo_rq(1));
        assert!(!decoded.has_data_set);
    }

    #[test]
    fn test_find_rq_has_data_set() {
        let rq = CommandSet::find_rq(7, uid::STUDY_ROOT_QR_FIND, Priority::Medium);
        let decoded = CommandSet::decode(&rq.encode().unwrap()).unwrap();
        assert!(decoded.has_data_set);
        assert_eq!(decoded.message_id, Some(7));
        assert_eq!(decoded.priority, Some(Priority::Medium));
        assert_eq!(
            decoded.affected_sop_class_uid.as_deref(),
            Some(uid::STUDY_ROOT_QR_FIND)
        );
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusType::from_status(0x0000), StatusType::Success);
        assert_eq!(StatusType::from_status(0xFF00), StatusType::Pending);
        assert_eq!(StatusType::from_status(0xFF01), StatusType::Pending);
        assert_eq!(StatusType::from_status(0xFE00), StatusType::Cancel);
        assert_eq!(StatusType::from_status(0xA700), StatusType::Failure);
        assert_eq!(StatusType::from_status(0xB000), StatusType::Failure);
    }

    #[test]
    fn test_response_without_status_rejected() {
        let mut rsp = CommandSet::response(CommandField::CEchoRsp, uid::VERIFICATION, 1, 0, false);
        rsp.status = None;
        let result = CommandSet::decode(&rsp.encode().unwrap());
        assert!(matches!(result, Err(DicomError::ProtocolViolation(_))));
    }

    #[test]
    fn test_cancel_rq() {
        let cancel = CommandSet::cancel_rq(3);
        let decoded = CommandSet::decode(&cancel.encode().unwrap()).unwrap();
        assert_eq!(decoded.command_field, CommandField::CCancelRq);
        assert_eq!(decoded.message_id_being_responded_to, Some(3));
    }

    #[test]
    fn test_unknown_command_field() {
        let mut ds = DataSet::new();
        ds.put_u16(tags::COMMAND_FIELD, 0x0001);
        ds.put_u16(tags::MESSAGE_ID, 1);
        let bytes = ds.encode(TransferSyntax::ImplicitVrLittleEndian).unwrap();
        assert!(matches!(
            CommandSet::decode(&bytes),
            Err(DicomError::ProtocolViolation(_))
        ));
    }
}
