//! Rule-match notification webhook.
//!
//! # Data Flow
//! ```text
//! MatchReporter ── JSON body ──► DispatcherPool::dispatcher() (per worker)
//!     → WebhookDispatcher::invoke
//!         → BackendManager::get(cluster)       (unknown cluster: log, drop)
//!         → tokio::spawn(POST uri, signed)     (caller never waits)
//!             → WebhookCallback::on_success / on_failure
//! ```
//!
//! # Design Decisions
//! - Deliveries are fire-and-forget: no retries, outcomes are only
//!   observed through the callback
//! - The destination is a named backend group; the configured URI supplies
//!   the path and the `Host` header
//! - Bodies are signed with HMAC-SHA256 when a secret is configured

pub mod dispatcher;
pub mod endpoint;
pub mod pool;
pub mod signing;

use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

pub use dispatcher::WebhookDispatcher;
pub use endpoint::WebhookEndpoint;
pub use pool::DispatcherPool;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook uri: {0}")]
    InvalidUri(#[from] url::ParseError),
    #[error("webhook uri has no host")]
    MissingHost,
    #[error("unsupported webhook uri scheme '{0}', only http is delivered")]
    UnsupportedScheme(String),
    #[error("webhook cluster name is empty")]
    EmptyCluster,
    #[error("webhook timeout must be greater than zero")]
    ZeroTimeout,
    #[error("failed to build webhook request: {0}")]
    Request(#[from] axum::http::Error),
}

/// Why a delivery did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The receiver answered with something other than 200.
    BadHttpStatus(u16),
    /// Connection or protocol error.
    Network,
    /// No answer within the configured timeout.
    Timeout,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::BadHttpStatus(_) => "bad_http_status",
            FailureReason::Network => "network",
            FailureReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::BadHttpStatus(status) => write!(f, "bad http status {}", status),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Observer of delivery outcomes.
pub trait WebhookCallback: Send + Sync {
    fn on_success(&self, status: StatusCode);
    fn on_failure(&self, reason: FailureReason);
}
