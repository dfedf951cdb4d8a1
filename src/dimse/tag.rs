//! Attribute tags, value representations and the built-in dictionary

use std::fmt;

/// DICOM attribute tag (group, element)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub fn group(self) -> u16 {
        self.0
    }

    pub fn element(self) -> u16 {
        self.1
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tags used by this crate
pub mod tags {
    use super::Tag;

    // Command group
    pub const COMMAND_GROUP_LENGTH: Tag = Tag(0x0000, 0x0000);
    pub const AFFECTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
    pub const COMMAND_FIELD: Tag = Tag(0x0000, 0x0100);
    pub const MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
    pub const MESSAGE_ID_BEING_RESPONDED_TO: Tag = Tag(0x0000, 0x0120);
    pub const PRIORITY: Tag = Tag(0x0000, 0x0700);
    pub const COMMAND_DATA_SET_TYPE: Tag = Tag(0x0000, 0x0800);
    pub const STATUS: Tag = Tag(0x0000, 0x0900);
    pub const ERROR_COMMENT: Tag = Tag(0x0000, 0x0902);

    // Identifier attributes
    pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    pub const STUDY_TIME: Tag = Tag(0x0008, 0x0030);
    pub const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
    pub const QUERY_RETRIEVE_LEVEL: Tag = Tag(0x0008, 0x0052);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const MODALITIES_IN_STUDY: Tag = Tag(0x0008, 0x0061);
    pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
    pub const PATIENT_SEX: Tag = Tag(0x0010, 0x0040);
    pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
    pub const STUDY_ID: Tag = Tag(0x0020, 0x0010);
    pub const SCHEDULED_STATION_AE_TITLE: Tag = Tag(0x0040, 0x0001);
    pub const SCHEDULED_PROCEDURE_STEP_START_DATE: Tag = Tag(0x0040, 0x0002);
    pub const SCHEDULED_PROCEDURE_STEP_START_TIME: Tag = Tag(0x0040, 0x0003);
    pub const SCHEDULED_PERFORMING_PHYSICIAN_NAME: Tag = Tag(0x0040, 0x0006);
    pub const SCHEDULED_PROCEDURE_STEP_DESCRIPTION: Tag = Tag(0x0040, 0x0007);
    pub const SCHEDULED_STATION_NAME: Tag = Tag(0x0040, 0x0010);
    pub const SCHEDULED_PROCEDURE_STEP_ID: Tag = Tag(0x0040, 0x0009);
    pub const SCHEDULED_PROCEDURE_STEP_SEQUENCE: Tag = Tag(0x0040, 0x0100);
    pub const REQUESTED_PROCEDURE_ID: Tag = Tag(0x0040, 0x1001);
    pub const REQUESTED_PROCEDURE_DESCRIPTION: Tag = Tag(0x0032, 0x1060);

    // Delimiters
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);
}

/// Value representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

impl Vr {
    /// Two-character code as written in explicit VR encodings
    pub fn code(self) -> [u8; 2] {
        let s = match self {
            Vr::AE => b"AE",
            Vr::AS => b"AS",
            Vr::AT => b"AT",
            Vr::CS => b"CS",
            Vr::DA => b"DA",
            Vr::DS => b"DS",
            Vr::DT => b"DT",
            Vr::FD => b"FD",
            Vr::FL => b"FL",
            Vr::IS => b"IS",
            Vr::LO => b"LO",
            Vr::LT => b"LT",
            Vr::OB => b"OB",
            Vr::OD => b"OD",
            Vr::OF => b"OF",
            Vr::OL => b"OL",
            Vr::OV => b"OV",
            Vr::OW => b"OW",
            Vr::PN => b"PN",
            Vr::SH => b"SH",
            Vr::SL => b"SL",
            Vr::SQ => b"SQ",
            Vr::SS => b"SS",
            Vr::ST => b"ST",
            Vr::SV => b"SV",
            Vr::TM => b"TM",
            Vr::UC => b"UC",
            Vr::UI => b"UI",
            Vr::UL => b"UL",
            Vr::UN => b"UN",
            Vr::UR => b"UR",
            Vr::US => b"US",
            Vr::UT => b"UT",
            Vr::UV => b"UV",
        };
        *s
    }

    /// Parse a two-character code; unknown codes map to `None`
    pub fn from_code(code: [u8; 2]) -> Option<Self> {
        Some(match &code {
            b"AE" => Vr::AE,
            b"AS" => Vr::AS,
            b"AT" => Vr::AT,
            b"CS" => Vr::CS,
            b"DA" => Vr::DA,
            b"DS" => Vr::DS,
            b"DT" => Vr::DT,
            b"FD" => Vr::FD,
            b"FL" => Vr::FL,
            b"IS" => Vr::IS,
            b"LO" => Vr::LO,
            b"LT" => Vr::LT,
            b"OB" => Vr::OB,
            b"OD" => Vr::OD,
            b"OF" => Vr::OF,
            b"OL" => Vr::OL,
            b"OV" => Vr::OV,
            b"OW" => Vr::OW,
            b"PN" => Vr::PN,
            b"SH" => Vr::SH,
            b"SL" => Vr::SL,
            b"SQ" => Vr::SQ,
            b"SS" => Vr::SS,
            b"ST" => Vr::ST,
            b"SV" => Vr::SV,
            b"TM" => Vr::TM,
            b"UC" => Vr::UC,
            b"UI" => Vr::UI,
            b"UL" => Vr::UL,
            b"UN" => Vr::UN,
            b"UR" => Vr::UR,
            b"US" => Vr::US,
            b"UT" => Vr::UT,
            b"UV" => Vr::UV,
            _ => return None,
        })
    }

    /// Explicit VR encodings use a 4-byte length (after 2 reserved bytes) for these
    pub fn has_long_length(self) -> bool {
        matches!(
            self,
            Vr::OB
                | Vr::OD
                | Vr::OF
                | Vr::OL
                | Vr::OV
                | Vr::OW
                | Vr::SQ
                | Vr::SV
                | Vr::UC
                | Vr::UN
                | Vr::UR
                | Vr::UT
                | Vr::UV
        )
    }

    /// Character string VRs (decoded through the specific character set)
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Vr::AE
                | Vr::AS
                | Vr::CS
                | Vr::DA
                | Vr::DS
                | Vr::DT
                | Vr::IS
                | Vr::LO
                | Vr::LT
                | Vr::PN
                | Vr::SH
                | Vr::ST
                | Vr::TM
                | Vr::UC
                | Vr::UI
                | Vr::UR
                | Vr::UT
        )
    }

    /// Byte used to pad values to even length
    pub fn padding(self) -> u8 {
        match self {
            Vr::UI => 0x00,
            v if v.is_text() => b' ',
            _ => 0x00,
        }
    }
}

/// VR of a known attribute; `UN` for anything outside the dictionary
///
/// Implicit VR decoding relies on this table.
pub fn dictionary_vr(tag: Tag) -> Vr {
    use tags::*;
    match tag {
        COMMAND_GROUP_LENGTH => Vr::UL,
        AFFECTED_SOP_CLASS_UID => Vr::UI,
        COMMAND_FIELD | MESSAGE_ID | MESSAGE_ID_BEING_RESPONDED_TO | PRIORITY
        | COMMAND_DATA_SET_TYPE | STATUS => Vr::US,
        ERROR_COMMENT => Vr::LO,
        SPECIFIC_CHARACTER_SET | QUERY_RETRIEVE_LEVEL | MODALITY | MODALITIES_IN_STUDY
        | PATIENT_SEX => Vr::CS,
        STUDY_DATE | PATIENT_BIRTH_DATE | SCHEDULED_PROCEDURE_STEP_START_DATE => Vr::DA,
        STUDY_TIME | SCHEDULED_PROCEDURE_STEP_START_TIME => Vr::TM,
        ACCESSION_NUMBER | STUDY_ID | SCHEDULED_STATION_NAME | SCHEDULED_PROCEDURE_STEP_ID
        | REQUESTED_PROCEDURE_ID => Vr::SH,
        STUDY_DESCRIPTION | PATIENT_ID | SCHEDULED_PROCEDURE_STEP_DESCRIPTION
        | REQUESTED_PROCEDURE_DESCRIPTION => Vr::LO,
        PATIENT_NAME | SCHEDULED_PERFORMING_PHYSICIAN_NAME => Vr::PN,
        STUDY_INSTANCE_UID => Vr::UI,
        SCHEDULED_STATION_AE_TITLE => Vr::AE,
        SCHEDULED_PROCEDURE_STEP_SEQUENCE => Vr::SQ,
        // group length elements of any group
        Tag(_, 0x0000) => Vr::UL,
        _ => Vr::UN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_ordering() {
        assert!(tags::COMMAND_FIELD < tags::MESSAGE_ID);
        assert!(tags::PATIENT_NAME < tags::STUDY_INSTANCE_UID);
        assert!(tags::SCHEDULED_PROCEDURE_STEP_START_DATE < tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(tags::PATIENT_NAME.to_string(), "(0010,0010)");
    }

    #[test]
    fn test_vr_code_roundtrip() {
        for vr in [Vr::AE, Vr::SQ, Vr::UI, Vr::US, Vr::UN] {
            assert_eq!(Vr::from_code(vr.code()), Some(vr));
        }
        assert_eq!(Vr::from_code(*b"ZZ"), None);
    }

    #[test]
    fn test_dictionary_unknown_is_un() {
        assert_eq!(dictionary_vr(tags::PATIENT_NAME), Vr::PN);
        assert_eq!(dictionary_vr(Tag(0x0009, 0x1001)), Vr::UN);
        assert_eq!(dictionary_vr(Tag(0x0008, 0x0000)), Vr::UL);
    }
}
