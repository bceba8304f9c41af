//! Upstream clusters.
//!
//! # Data Flow
//! ```text
//! Route matched → backend_group        Webhook → cluster name
//!            \                          /
//!             → pool.rs (named groups) ←
//!                 → round_robin.rs (next member with spare capacity)
//!                 → backend.rs (connection guard)
//! ```
//!
//! # Design Decisions
//! - Groups are built once from configuration and never change
//! - A member at its connection cap is passed over; a group with every
//!   member at the cap yields nothing
//! - Proxied requests and webhook deliveries share the same groups and caps

pub mod backend;
pub mod pool;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

pub use backend::{Backend, BackendConnectionGuard};
pub use pool::BackendManager;
pub use round_robin::RoundRobin;

/// Member selection strategy for one group.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
