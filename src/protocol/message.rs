//! PDU body trait and the complete PDU enum
//!
//! This module defines the common interface that all PDU bodies implement,
//! and the [`Pdu`] enum used to encode and decode whole PDUs (header + body).

use crate::error::{DicomError, Result};
use crate::protocol::header::{PduHeader, PduType};
use crate::protocol::types::*;
use bytes::{Bytes, BytesMut};

/// Common interface for all upper layer PDU bodies
///
/// Each PDU (A-ASSOCIATE-RQ, P-DATA-TF, A-ABORT, ...) implements this trait to
/// provide body encoding/decoding. The 6-byte header is handled by [`Pdu`].
pub trait PduBody: Sized {
    /// Returns the PDU type code this body belongs to
    fn pdu_type() -> PduType;

    /// Encode the body (without header)
    fn encode_body(&self) -> Result<Vec<u8>>;

    /// Decode the body (without header)
    ///
    /// # Arguments
    /// * `data` - Exactly the bytes declared by the PDU header length
    fn decode_body(data: &[u8]) -> Result<Self>;
}

/// Any upper layer PDU
///
/// # Examples
///
/// ```
/// use dicomtools_rust::protocol::{Decoded, Pdu, types::ReleaseRq};
///
/// let bytes = Pdu::ReleaseRq(ReleaseRq).encode().unwrap();
/// assert_eq!(&bytes[..], &[0x05, 0, 0, 0, 0, 4, 0, 0, 0, 0]);
///
/// match Pdu::decode(&bytes).unwrap() {
///     Decoded::Complete { pdu, consumed } => {
///         assert_eq!(pdu, Pdu::ReleaseRq(ReleaseRq));
///         assert_eq!(consumed, 10);
///     }
///     Decoded::NeedMoreData => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    AssociateRq(AssociateRq),
    AssociateAc(AssociateAc),
    AssociateRj(AssociateRj),
    PData(PData),
    ReleaseRq(ReleaseRq),
    ReleaseRp(ReleaseRp),
    Abort(Abort),
}

/// Result of decoding from a possibly partial buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full PDU was decoded; `consumed` bytes may be dropped from the buffer
    Complete { pdu: Pdu, consumed: usize },
    /// The buffer does not yet hold a full PDU
    NeedMoreData,
}

fn encode_with_header<T: PduBody>(body: &T) -> Result<Bytes> {
    let content = body.encode_body()?;
    let length = u32::try_from(content.len()).map_err(|_| {
        DicomError::violation(format!(
            "{} body too large: {} bytes",
            T::pdu_type(),
            content.len()
        ))
    })?;
    let header = PduHeader {
        pdu_type: T::pdu_type(),
        length,
    };
    let mut buf = BytesMut::with_capacity(header.total_size());
    header.encode_into(&mut buf);
    buf.extend_from_slice(&content);
    Ok(buf.freeze())
}

impl Pdu {
    /// PDU type code of this PDU
    pub fn pdu_type(&self) -> PduType {
        match self {
            Pdu::AssociateRq(_) => PduType::AssociateRq,
            Pdu::AssociateAc(_) => PduType::AssociateAc,
            Pdu::AssociateRj(_) => PduType::AssociateRj,
            Pdu::PData(_) => PduType::PData,
            Pdu::ReleaseRq(_) => PduType::ReleaseRq,
            Pdu::ReleaseRp(_) => PduType::ReleaseRp,
            Pdu::Abort(_) => PduType::Abort,
        }
    }

    /// Encode the complete PDU (header + body)
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Pdu::AssociateRq(body) => encode_with_header(body),
            Pdu::AssociateAc(body) => encode_with_header(body),
            Pdu::AssociateRj(body) => encode_with_header(body),
            Pdu::PData(body) => encode_with_header(body),
            Pdu::ReleaseRq(body) => encode_with_header(body),
            Pdu::ReleaseRp(body) => encode_with_header(body),
            Pdu::Abort(body) => encode_with_header(body),
        }
    }

    /// Decode one PDU from the front of `data`
    ///
    /// Returns [`Decoded::NeedMoreData`] when fewer bytes than the header
    /// declares are available. Trailing bytes after the PDU are left alone.
    pub fn decode(data: &[u8]) -> Result<Decoded> {
        if data.len() < PduHeader::SIZE {
            return Ok(Decoded::NeedMoreData);
        }
        let header = PduHeader::decode(data)?;
        let total = header.total_size();
        if data.len() < total {
            return Ok(Decoded::NeedMoreData);
        }
        let pdu = Self::decode_body(header.pdu_type, &data[PduHeader::SIZE..total])?;
        Ok(Decoded::Complete {
            pdu,
            consumed: total,
        })
    }

    /// Decode a body whose header was already consumed
    pub fn decode_body(pdu_type: PduType, body: &[u8]) -> Result<Self> {
        Ok(match pdu_type {
            PduType::AssociateRq => Pdu::AssociateRq(AssociateRq::decode_body(body)?),
            PduType::AssociateAc => Pdu::AssociateAc(AssociateAc::decode_body(body)?),
            PduType::AssociateRj => Pdu::AssociateRj(AssociateRj::decode_body(body)?),
            PduType::PData => Pdu::PData(PData::decode_body(body)?),
            PduType::ReleaseRq => Pdu::ReleaseRq(ReleaseRq::decode_body(body)?),
            PduType::ReleaseRp => Pdu::ReleaseRp(ReleaseRp::decode_body(body)?),
            PduType::Abort => Pdu::Abort(Abort::decode_body(body)?),
        })
    }
}
