//! Well-known UIDs and negotiation constants

/// DICOM application context name
pub const APPLICATION_CONTEXT: &str = "1.2.840.10008.3.1.1.1";

/// Implicit VR Little Endian transfer syntax
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR Little Endian transfer syntax
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Verification SOP Class (C-ECHO)
pub const VERIFICATION: &str = "1.2.840.10008.1.1";
/// Patient Root Query/Retrieve Information Model - FIND
pub const PATIENT_ROOT_QR_FIND: &str = "1.2.840.10008.5.1.4.1.2.1.1";
/// Study Root Query/Retrieve Information Model - FIND
pub const STUDY_ROOT_QR_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
/// Modality Worklist Information Model - FIND
pub const MODALITY_WORKLIST_FIND: &str = "1.2.840.10008.5.1.4.31";

/// Implementation class UID sent in the user information item
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.9.7433.1.1";
/// Implementation version name sent in the user information item (max 16 chars)
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOMTOOLS_RS01";

/// Default maximum PDU length
pub const DEFAULT_MAX_PDU: u32 = 16_384;
/// Smallest maximum PDU length accepted in configuration
pub const MINIMUM_PDU_SIZE: u32 = 4_096;
/// Largest maximum PDU length accepted in configuration
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// Transfer syntaxes understood by the data set codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferSyntax {
    ImplicitVrLittleEndian,
    ExplicitVrLittleEndian,
}

impl TransferSyntax {
    /// Look up a transfer syntax by UID (trailing NUL/space padding ignored)
    pub fn from_uid(uid: &str) -> Option<Self> {
        match trim_uid(uid) {
            IMPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ImplicitVrLittleEndian),
            EXPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ExplicitVrLittleEndian),
            _ => None,
        }
    }

    pub fn uid(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrLittleEndian => EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }

    pub fn is_explicit_vr(self) -> bool {
        matches!(self, TransferSyntax::ExplicitVrLittleEndian)
    }
}

/// Strip UID padding (trailing NUL or space)
pub fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c == '\0' || c == ' ')
}
