//! DIMSE message layer
//!
//! Command sets, data sets and their transport over P-DATA-TF PDUs.

pub mod command;
pub mod dataset;
pub mod fragment;
pub mod tag;

pub use command::{CommandField, CommandSet, Priority, StatusType};
pub use dataset::{CharacterSet, DataSet, Element, Value};
pub use fragment::{fragment, DimseMessage, Reassembler};
pub use tag::{tags, Tag, Vr};
