//! DICOM upper layer protocol implementation module
//!
//! This module contains the PDU header, the PDU bodies and the streaming
//! reader that turns transport bytes back into PDUs.

pub mod header;
pub mod message;
pub mod reader;
pub mod types;
pub mod uid;

// Re-export commonly used types
pub use header::{AeTitle, PduHeader, PduType};
pub use message::{Decoded, Pdu, PduBody};
pub use reader::PduReader;
pub use uid::TransferSyntax;
