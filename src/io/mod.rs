//! Network I/O module for DICOM associations
//!
//! Provides the transport (TCP or TLS), association negotiation and the
//! dispatcher that correlates DIMSE requests with their responses.

pub mod association;
pub mod dispatcher;
pub mod tls;
pub mod transport;

pub use association::{Association, AssociationOptions, AssociationState, NegotiatedContext};
pub use dispatcher::{DimseResponse, QueueConfig, ResponseStream};
pub use tls::TlsOptions;
pub use transport::Transport;
