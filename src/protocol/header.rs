//! DICOM upper layer PDU header implementation
//!
//! Every PDU starts with a fixed 6-byte header: PDU type, one reserved byte
//! and the length of the remaining body as a big-endian `u32`.

use crate::error::{DicomError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// PDU type codes (PS3.8 section 9.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    AssociateRq = 0x01,
    AssociateAc = 0x02,
    AssociateRj = 0x03,
    PData = 0x04,
    ReleaseRq = 0x05,
    ReleaseRp = 0x06,
    Abort = 0x07,
}

impl PduType {
    /// Name used in logs, e.g. "A-ASSOCIATE-RQ"
    pub fn name(self) -> &'static str {
        match self {
            PduType::AssociateRq => "A-ASSOCIATE-RQ",
            PduType::AssociateAc => "A-ASSOCIATE-AC",
            PduType::AssociateRj => "A-ASSOCIATE-RJ",
            PduType::PData => "P-DATA-TF",
            PduType::ReleaseRq => "A-RELEASE-RQ",
            PduType::ReleaseRp => "A-RELEASE-RP",
            PduType::Abort => "A-ABORT",
        }
    }
}

impl TryFrom<u8> for PduType {
    type Error = DicomError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(PduType::AssociateRq),
            0x02 => Ok(PduType::AssociateAc),
            0x03 => Ok(PduType::AssociateRj),
            0x04 => Ok(PduType::PData),
            0x05 => Ok(PduType::ReleaseRq),
            0x06 => Ok(PduType::ReleaseRp),
            0x07 => Ok(PduType::Abort),
            other => Err(DicomError::violation(format!(
                "Unknown PDU type 0x{:02X}",
                other
            ))),
        }
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type-safe wrapper for an Application Entity title (16 bytes, space-padded)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AeTitle([u8; 16]);

impl AeTitle {
    /// Maximum AE title length in characters
    pub const MAX_LEN: usize = 16;

    /// Create a new AE title
    ///
    /// Leading and trailing spaces are not significant. The remaining title
    /// must be 1-16 printable ASCII characters and must not contain a backslash.
    ///
    /// # Examples
    ///
    /// ```
    /// use dicomtools_rust::protocol::header::AeTitle;
    ///
    /// let ae = AeTitle::new("DICOMTOOLS-SCU").unwrap();
    /// assert_eq!(ae.as_str(), "DICOMTOOLS-SCU");
    /// assert!(AeTitle::new("THIS-TITLE-IS-TOO-LONG").is_err());
    /// ```
    pub fn new(title: &str) -> Result<Self> {
        let trimmed = title.trim_matches(' ');
        if trimmed.is_empty() {
            return Err(DicomError::InvalidConfig(
                "AE title must not be empty".to_string(),
            ));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DicomError::InvalidConfig(format!(
                "AE title too long: {} characters (max: {})",
                trimmed.len(),
                Self::MAX_LEN
            )));
        }
        if !trimmed.bytes().all(|b| (0x20..0x7F).contains(&b) && b != b'\\') {
            return Err(DicomError::InvalidConfig(format!(
                "AE title {:?} contains invalid characters",
                trimmed
            )));
        }
        let mut bytes = [b' '; 16];
        bytes[..trimmed.len()].copy_from_slice(trimmed.as_bytes());
        Ok(AeTitle(bytes))
    }

    /// Get the AE title as a string (trimming padding)
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0)
            .unwrap_or("")
            .trim_matches(|c: char| c == ' ' || c == '\0')
    }

    /// Raw 16-byte wire representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for AeTitle {
    fn from(bytes: [u8; 16]) -> Self {
        AeTitle(bytes)
    }
}

impl fmt::Debug for AeTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AeTitle({:?})", self.as_str())
    }
}

impl fmt::Display for AeTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper layer PDU header (6 bytes fixed size)
///
/// # Header Structure
/// - PDU type: u8
/// - Reserved: u8
/// - PDU length: u32 (big-endian), length of the body that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    /// PDU type
    pub pdu_type: PduType,
    /// Body length in bytes
    pub length: u32,
}

impl PduHeader {
    /// Header size in bytes
    pub const SIZE: usize = 6;

    /// Decode a header from a byte slice
    ///
    /// # Arguments
    /// * `buf` - Byte slice containing at least 6 bytes
    ///
    /// # Returns
    /// Decoded header, `IncompleteMessage` if the buffer is too short, or
    /// `ProtocolViolation` for an unknown PDU type
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(DicomError::IncompleteMessage(format!(
                "PDU header needs {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }

        let mut cursor = std::io::Cursor::new(buf);
        let pdu_type = PduType::try_from(cursor.get_u8())?;
        let _reserved = cursor.get_u8();
        let length = cursor.get_u32();

        Ok(PduHeader { pdu_type, length })
    }

    /// Encode the header into a buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.pdu_type as u8);
        buf.put_u8(0);
        buf.put_u32(self.length);
    }

    /// Total size of the PDU this header describes
    pub fn total_size(&self) -> usize {
        Self::SIZE + self.length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ae_title_padding() {
        let ae = AeTitle::new("ANY-SCP").unwrap();
        assert_eq!(&ae.as_bytes()[..7], b"ANY-SCP");
        assert!(ae.as_bytes()[7..].iter().all(|&b| b == b' '));
        assert_eq!(ae.as_str(), "ANY-SCP");
    }

    #[test]
    fn test_ae_title_rejects_bad_input() {
        assert!(AeTitle::new("").is_err());
        assert!(AeTitle::new("    ").is_err());
        assert!(AeTitle::new("ABCDEFGHIJKLMNOPQ").is_err());
        assert!(AeTitle::new("BAD\\AE").is_err());
        assert!(AeTitle::new("TAB\tAE").is_err());
    }

    #[test]
    fn test_ae_title_exactly_sixteen() {
        let ae = AeTitle::new("ABCDEFGHIJKLMNOP").unwrap();
        assert_eq!(ae.as_str(), "ABCDEFGHIJKLMNOP");
    }

    #[test]
    fn test_header_size() {
        assert_eq!(PduHeader::SIZE, 6);
    }

    #[test]
    fn test_header_roundtrip() {
        let original = PduHeader {
            pdu_type: PduType::PData,
            length: 0x0102_0304,
        };
        let mut buf = BytesMut::new();
        original.encode_into(&mut buf);
        assert_eq!(&buf[..], &[0x04, 0x00, 0x01, 0x02, 0x03, 0x04]);

        let decoded = PduHeader::decode(&buf).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.total_size(), 6 + 0x0102_0304);
    }

    #[test]
    fn test_header_decode_short_buffer() {
        let result = PduHeader::decode(&[0x01, 0x00, 0x00]);
        assert!(matches!(result, Err(DicomError::IncompleteMessage(_))));
    }

    #[test]
    fn test_header_unknown_type() {
        let result = PduHeader::decode(&[0x09, 0x00, 0x00, 0x00, 0x00, 0x04]);
        assert!(matches!(result, Err(DicomError::ProtocolViolation(_))));
    }
}
