//! Verdict engine abstraction.
//!
//! # Data Flow
//! ```text
//! filter::Transaction
//!     → EngineTransaction (connection, uri, headers, body, logging)
//!     → rule evaluation (engine internal)
//!     → Intervention { disruptive, status }   (queried after each phase)
//!     → RuleMatchSink::on_rule_match          (zero or more times per phase)
//! ```
//!
//! # Design Decisions
//! - The engine is a black box behind two traits; the filter never inspects
//!   rules, only the verdict and the rule-engine mode
//! - One `EngineTransaction` per HTTP request/response pair
//! - Rule matches are pushed through a sink handed over at transaction
//!   creation, so the engine needs no back-pointer into the filter

pub mod signature;

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Verdict returned by the engine after a phase call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intervention {
    /// The engine asks for the transaction to be blocked.
    pub disruptive: bool,
    /// HTTP status code of the blocking reply.
    pub status: u16,
}

impl Intervention {
    /// A disruptive verdict with the given status code.
    pub fn block(status: u16) -> Self {
        Self {
            disruptive: true,
            status,
        }
    }
}

/// Rule engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEngineMode {
    /// Rules are evaluated and disruptive actions block.
    Enabled,
    /// Rules are evaluated and logged, nothing is ever blocked.
    DetectionOnly,
    /// Nothing is evaluated.
    Disabled,
}

/// A single rule match reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub rule_id: String,
    pub phase: u8,
    pub is_disruptive: bool,
    pub message: String,
    /// Excerpt of the value that matched.
    pub data: String,
    pub uri: String,
    pub client_ip: String,
    /// Status code carried by the rule's action, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RuleMatch {
    /// Human readable one-line rendering used in the filter's logs.
    pub fn log_line(&self) -> String {
        format!(
            "[client {}] [id \"{}\"] [msg \"{}\"] [data \"{}\"] [uri \"{}\"]",
            self.client_ip, self.rule_id, self.message, self.data, self.uri
        )
    }

    /// JSON description posted to the notification webhook.
    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Receives rule matches from an engine transaction.
///
/// Engines may call this zero or more times per phase. A `None` record is an
/// engine anomaly the receiver must tolerate.
pub trait RuleMatchSink: Send + Sync {
    fn on_rule_match(&self, record: Option<&RuleMatch>);
}

/// Factory for per-request engine transactions. Shared read-only by all
/// workers.
pub trait VerdictEngine: Send + Sync {
    fn new_transaction(&self, sink: Arc<dyn RuleMatchSink>) -> Box<dyn EngineTransaction>;
}

/// Evaluation context for one HTTP transaction.
pub trait EngineTransaction: Send {
    fn process_connection(&mut self, client: SocketAddr, server: SocketAddr);

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str);

    fn add_request_header(&mut self, name: &str, value: &[u8]);

    fn process_request_headers(&mut self);

    /// Appends a request body chunk. Returns `false` when the chunk could not
    /// be appended in full.
    fn append_request_body(&mut self, chunk: &[u8]) -> bool;

    /// Number of request body bytes the engine currently holds.
    fn request_body_length(&self) -> usize;

    fn process_request_body(&mut self);

    fn add_response_header(&mut self, name: &str, value: &[u8]);

    fn process_response_headers(&mut self, status: u16, protocol: &str);

    fn append_response_body(&mut self, chunk: &[u8]) -> bool;

    fn response_body_length(&self) -> usize;

    fn process_response_body(&mut self);

    /// Flushes pending rule-match records. Called once at teardown.
    fn process_logging(&mut self);

    fn intervention(&self) -> Intervention;

    fn rule_engine_mode(&self) -> RuleEngineMode;
}
