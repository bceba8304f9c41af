//! Transaction lifecycle state machine.
//!
//! # Responsibilities
//! - Own the engine transaction for one request/response pair
//! - Sequence phases: each runs at most once, strictly in order
//! - Detect body-limit exhaustion on every appended chunk
//! - Latch the intervention flag the first time the engine turns disruptive
//! - Run the logging phase exactly once, at the latest when dropped
//!
//! # Design Decisions
//! - Phase progress is a single monotonic marker; a phase whose turn has
//!   passed is skipped and logged at debug instead of re-run
//! - `intervened` is latched before a verdict is returned, so side effects
//!   triggered by the caller (the local reply) can never re-enter the engine

use std::net::SocketAddr;

use crate::engine::{EngineTransaction, Intervention, RuleEngineMode};
use crate::filter::headers::{with_host_alias, HeaderField};
use crate::filter::phase::{Direction, Phase, Protocol};

/// Outcome of feeding one body chunk to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyAppend {
    /// The chunk was taken in full; keep accumulating.
    Appended,
    /// The engine holds all it will take; the body phase must run now.
    LimitReached,
    /// The body phase for this direction is already over.
    Closed,
}

pub struct Transaction {
    id: String,
    engine: Box<dyn EngineTransaction>,
    /// Last phase that was handed to the engine.
    last_phase: Option<Phase>,
    intervened: bool,
    request_processed: bool,
    response_processed: bool,
    request_body_bytes: u64,
    response_body_bytes: u64,
}

impl Transaction {
    pub fn new(id: impl Into<String>, engine: Box<dyn EngineTransaction>) -> Self {
        Self {
            id: id.into(),
            engine,
            last_phase: None,
            intervened: false,
            request_processed: false,
            response_processed: false,
            request_body_bytes: 0,
            response_body_bytes: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn intervened(&self) -> bool {
        self.intervened
    }

    pub fn request_processed(&self) -> bool {
        self.request_processed
    }

    pub fn response_processed(&self) -> bool {
        self.response_processed
    }

    pub fn mark_request_processed(&mut self) {
        self.request_processed = true;
    }

    pub fn mark_response_processed(&mut self) {
        self.response_processed = true;
    }

    /// Body bytes seen on the request path, including those past the limit.
    pub fn request_body_bytes(&self) -> u64 {
        self.request_body_bytes
    }

    pub fn response_body_bytes(&self) -> u64 {
        self.response_body_bytes
    }

    pub fn last_phase(&self) -> Option<Phase> {
        self.last_phase
    }

    pub fn logged(&self) -> bool {
        self.last_phase == Some(Phase::Logging)
    }

    pub fn rule_engine_mode(&self) -> RuleEngineMode {
        self.engine.rule_engine_mode()
    }

    /// Claims `phase` for execution.
    fn enter(&mut self, phase: Phase) -> bool {
        if self.intervened && phase != Phase::Logging {
            tracing::debug!(txn = %self.id, phase = %phase, "Phase skipped, transaction intervened");
            return false;
        }
        if self.last_phase >= Some(phase) {
            tracing::debug!(txn = %self.id, phase = %phase, "Phase skipped, already processed");
            return false;
        }
        self.last_phase = Some(phase);
        true
    }

    /// Queries the engine verdict.
    ///
    /// Returns the intervention the first time the engine reports a
    /// disruptive verdict; the transaction is intervened from then on and
    /// later calls return `None`.
    pub fn poll_intervention(&mut self) -> Option<Intervention> {
        if self.intervened {
            return None;
        }
        let verdict = self.engine.intervention();
        if !verdict.disruptive {
            return None;
        }
        self.intervened = true;
        tracing::debug!(txn = %self.id, status = verdict.status, "Intervention");
        Some(verdict)
    }

    pub fn process_connection(&mut self, client: SocketAddr, server: SocketAddr) -> Option<Intervention> {
        if !self.enter(Phase::Connection) {
            return None;
        }
        self.engine.process_connection(client, server);
        self.poll_intervention()
    }

    pub fn process_uri(&mut self, uri: &str, method: &str, protocol: Protocol) -> Option<Intervention> {
        if !self.enter(Phase::Uri) {
            return None;
        }
        self.engine.process_uri(uri, method, protocol.as_str());
        self.poll_intervention()
    }

    pub fn process_request_headers<'a, I>(&mut self, headers: I) -> Option<Intervention>
    where
        I: IntoIterator<Item = HeaderField<'a>>,
    {
        if !self.enter(Phase::RequestHeaders) {
            return None;
        }
        for (name, value) in with_host_alias(headers) {
            self.engine.add_request_header(name, value);
        }
        self.engine.process_request_headers();
        self.poll_intervention()
    }

    pub fn append_request_body(&mut self, chunk: &[u8]) -> BodyAppend {
        self.append_body(Direction::Request, chunk)
    }

    pub fn process_request_body(&mut self) -> Option<Intervention> {
        if !self.enter(Phase::RequestBody) {
            return None;
        }
        self.engine.process_request_body();
        self.poll_intervention()
    }

    pub fn process_response_headers<'a, I>(
        &mut self,
        status: u16,
        protocol: Protocol,
        headers: I,
    ) -> Option<Intervention>
    where
        I: IntoIterator<Item = HeaderField<'a>>,
    {
        if !self.enter(Phase::ResponseHeaders) {
            return None;
        }
        for (name, value) in headers {
            self.engine.add_response_header(name, value);
        }
        self.engine.process_response_headers(status, protocol.as_str());
        self.poll_intervention()
    }

    pub fn append_response_body(&mut self, chunk: &[u8]) -> BodyAppend {
        self.append_body(Direction::Response, chunk)
    }

    pub fn process_response_body(&mut self) -> Option<Intervention> {
        if !self.enter(Phase::ResponseBody) {
            return None;
        }
        self.engine.process_response_body();
        self.poll_intervention()
    }

    /// Runs the logging phase. Only the first call reaches the engine.
    pub fn process_logging(&mut self) {
        if !self.enter(Phase::Logging) {
            return;
        }
        tracing::debug!(txn = %self.id, "Logging phase");
        self.engine.process_logging();
    }

    fn append_body(&mut self, direction: Direction, chunk: &[u8]) -> BodyAppend {
        let body_phase = match direction {
            Direction::Request => Phase::RequestBody,
            Direction::Response => Phase::ResponseBody,
        };
        if self.intervened || self.last_phase >= Some(body_phase) {
            return BodyAppend::Closed;
        }

        let (accepted, before, after) = match direction {
            Direction::Request => {
                self.request_body_bytes += chunk.len() as u64;
                let before = self.engine.request_body_length();
                let accepted = self.engine.append_request_body(chunk);
                (accepted, before, self.engine.request_body_length())
            }
            Direction::Response => {
                self.response_body_bytes += chunk.len() as u64;
                let before = self.engine.response_body_length();
                let accepted = self.engine.append_response_body(chunk);
                (accepted, before, self.engine.response_body_length())
            }
        };

        // Some engines accept a chunk past the limit without storing it.
        if !accepted || (!chunk.is_empty() && after == before) {
            tracing::debug!(
                txn = %self.id,
                direction = direction.as_str(),
                held = after,
                "Body limit reached"
            );
            return BodyAppend::LimitReached;
        }
        BodyAppend::Appended
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.process_logging();
    }
}
