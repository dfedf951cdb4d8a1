//! Upper layer PDU type implementations
//!
//! One module per PDU family. Each body type implements
//! [`PduBody`](crate::protocol::message::PduBody).

pub mod abort;
pub mod associate;
pub mod pdata;
pub mod reject;
pub mod release;

pub use abort::{Abort, AbortReason, AbortSource};
pub use associate::{
    AssociateAc, AssociateRq, PresentationContextProposed, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
pub use pdata::{PData, PDataValue, PDataValueType};
pub use reject::{
    AcseProviderReason, AssociateRj, PresentationProviderReason, RejectResult, RejectSource,
    ServiceUserReason,
};
pub use release::{ReleaseRp, ReleaseRq};

use crate::error::{DicomError, Result};
use bytes::BufMut;

/// A variable item inside an association PDU (type, reserved, u16 length, data)
#[derive(Debug, Clone, Copy)]
pub(crate) struct Item<'a> {
    pub item_type: u8,
    pub data: &'a [u8],
}

/// Split a byte slice into consecutive items
///
/// `context` names the enclosing structure for error messages.
pub(crate) fn parse_items<'a>(mut data: &'a [u8], context: &str) -> Result<Vec<Item<'a>>> {
    let mut items = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err(DicomError::violation(format!(
                "Truncated item header in {} ({} bytes left)",
                context,
                data.len()
            )));
        }
        let item_type = data[0];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + length {
            return Err(DicomError::violation(format!(
                "Item 0x{:02X} in {} declares {} bytes but only {} remain",
                item_type,
                context,
                length,
                data.len() - 4
            )));
        }
        items.push(Item {
            item_type,
            data: &data[4..4 + length],
        });
        data = &data[4 + length..];
    }
    Ok(items)
}

/// Append an item with a u16 length field
pub(crate) fn put_item(buf: &mut Vec<u8>, item_type: u8, body: &[u8]) -> Result<()> {
    let length = u16::try_from(body.len()).map_err(|_| {
        DicomError::violation(format!(
            "Item 0x{:02X} too large: {} bytes",
            item_type,
            body.len()
        ))
    })?;
    buf.put_u8(item_type);
    buf.put_u8(0);
    buf.put_u16(length);
    buf.extend_from_slice(body);
    Ok(())
}

/// Decode a UID or text item value, dropping NUL/space padding
pub(crate) fn item_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches(|c: char| c == '\0' || c == ' ')
        .to_string()
}
