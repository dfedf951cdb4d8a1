//! Query construction and response interpretation
//!
//! - [`builder`]: C-FIND identifiers for study and worklist queries
//! - [`datetime`]: DA/TM/DT parsing
//! - [`results`]: typed records built from response identifiers
//!
//! Matching is done by the remote AE; nothing is filtered locally.

pub mod builder;
pub mod datetime;
pub mod results;

pub use builder::{DateRange, QueryBuilder, QueryModel, StudyQuery, WorklistQuery};
pub use datetime::{parse_date_time, parse_datetime, DicomDateTime};
pub use results::{ScheduledStep, StudyRecord, WorklistRecord};
