//! HTTP inspection filter.
//!
//! # Responsibilities
//! - Feed every phase of a transaction to the verdict engine
//! - Enforce blocking verdicts with a single local reply
//! - Decide, per pipeline callback, whether traffic continues, is held, or
//!   is stopped
//!
//! # Layout
//! - `transaction`: phase sequencing, body limits, the intervention latch
//! - `gate`: pipeline callbacks and flow-control statuses
//! - `config`: engine and reporter shared by all transactions
//! - `reporter`: rule-match logging and webhook notification

pub mod config;
pub mod gate;
pub mod headers;
pub mod phase;
pub mod reporter;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::InspectionConfig;
pub use gate::{
    ConnectionInfo, DataStatus, FilterCallbacks, HeadersStatus, InspectionFilter, LocalReply, TrailersStatus,
    BLOCKED_BODY,
};
pub use phase::{Direction, Phase, Protocol};
pub use transaction::{BodyAppend, Transaction};
