//! Filter gate: pipeline callbacks to flow-control statuses.
//!
//! # Data Flow
//! ```text
//! decode_headers → decode_data* → decode_trailers?      (request path)
//! encode_headers → encode_data* → encode_trailers?      (response path)
//!        │
//!        ▼
//!   Transaction phase call ── Intervention ──► send_local_reply (once)
//!        │
//!        ▼
//!   HeadersStatus / DataStatus / TrailersStatus
//! ```
//!
//! # Design Decisions
//! - Route disable flags are read once per direction, at header time
//! - On intervention the transaction is latched first, then the reply is
//!   sent; the reply re-entering the encode path meets an intervened
//!   transaction and passes with `Continue`
//! - End of stream seen at header time, or trailers ending a body, run the
//!   body phase so every direction that was inspected gets its terminal call

use std::net::SocketAddr;

use axum::http::{request, response, StatusCode, Version};

use crate::config::InspectionFlags;
use crate::engine::{Intervention, RuleEngineMode};
use crate::filter::config::InspectionConfig;
use crate::filter::headers::{request_fields, request_target, response_fields};
use crate::filter::phase::{Direction, Protocol};
use crate::filter::transaction::{BodyAppend, Transaction};
use crate::observability::metrics;

/// Body of the local reply sent when a transaction is blocked.
pub const BLOCKED_BODY: &str = "Request blocked by inspection filter\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersStatus {
    Continue,
    StopIteration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    Continue,
    /// Hold the chunk and keep delivering the following ones.
    StopIterationAndBuffer,
    /// Drop the chunk and stop the stream.
    StopIterationNoBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailersStatus {
    Continue,
    StopIteration,
}

/// Addresses of the downstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub downstream: SocketAddr,
    pub local: SocketAddr,
}

/// Reply generated by the filter in place of the upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReply {
    pub status: StatusCode,
    pub body: &'static str,
}

impl LocalReply {
    /// Blocking reply for `intervention`, 403 when its status is unusable.
    pub fn blocked(intervention: Intervention) -> Self {
        let status = StatusCode::from_u16(intervention.status).unwrap_or_else(|_| {
            tracing::warn!(status = intervention.status, "Invalid intervention status, using 403");
            StatusCode::FORBIDDEN
        });
        Self {
            status,
            body: BLOCKED_BODY,
        }
    }
}

/// What the gate needs from the pipeline hosting it.
pub trait FilterCallbacks {
    fn connection(&self) -> ConnectionInfo;

    /// Protocol of the stream, if known.
    fn protocol(&self) -> Option<Version>;

    /// Inspection flags of the matched route.
    fn route_flags(&self) -> InspectionFlags;

    fn send_local_reply(&mut self, reply: LocalReply);
}

pub struct InspectionFilter<C> {
    txn: Transaction,
    callbacks: C,
}

impl<C: FilterCallbacks> InspectionFilter<C> {
    pub fn new(config: &InspectionConfig, id: impl Into<String>, callbacks: C) -> Self {
        Self::with_transaction(config.new_transaction(id), callbacks)
    }

    pub fn with_transaction(txn: Transaction, callbacks: C) -> Self {
        Self { txn, callbacks }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Request headers arrived.
    pub fn decode_headers(&mut self, head: &request::Parts, end_stream: bool) -> HeadersStatus {
        if self.txn.intervened() || self.txn.request_processed() {
            return self.request_headers_status();
        }

        // 1. Route opt-out
        let flags = self.callbacks.route_flags();
        if flags.disable || flags.disable_request {
            tracing::debug!(txn = %self.txn.id(), "Request inspection disabled for route");
            self.txn.mark_request_processed();
            return HeadersStatus::Continue;
        }

        // 2. Connection
        let connection = self.callbacks.connection();
        let verdict = self.txn.process_connection(connection.downstream, connection.local);
        if self.intervene(verdict, Direction::Request) {
            return HeadersStatus::StopIteration;
        }

        // 3. URI
        let protocol = Protocol::resolve(self.callbacks.protocol());
        let verdict = self
            .txn
            .process_uri(request_target(&head.uri), head.method.as_str(), protocol);
        if self.intervene(verdict, Direction::Request) {
            return HeadersStatus::StopIteration;
        }

        // 4. Headers
        let verdict = self.txn.process_request_headers(request_fields(head));
        if self.intervene(verdict, Direction::Request) {
            return HeadersStatus::StopIteration;
        }

        // 5. Bodiless request
        if end_stream {
            self.txn.mark_request_processed();
            let verdict = self.txn.process_request_body();
            if self.intervene(verdict, Direction::Request) {
                return HeadersStatus::StopIteration;
            }
        }

        self.request_headers_status()
    }

    /// A request body chunk arrived.
    pub fn decode_data(&mut self, data: &[u8], end_stream: bool) -> DataStatus {
        if self.txn.intervened() || self.txn.request_processed() {
            return self.request_data_status();
        }

        let appended = self.txn.append_request_body(data);
        let verdict = self.txn.poll_intervention();
        if self.intervene(verdict, Direction::Request) {
            return DataStatus::StopIterationNoBuffer;
        }

        let limit_reached = match appended {
            BodyAppend::Appended => false,
            BodyAppend::LimitReached => {
                metrics::record_body_limit(Direction::Request);
                true
            }
            // The body phase is already behind the transaction.
            BodyAppend::Closed => {
                self.txn.mark_request_processed();
                return self.request_data_status();
            }
        };

        if end_stream || limit_reached {
            self.txn.mark_request_processed();
            let verdict = self.txn.process_request_body();
            if self.intervene(verdict, Direction::Request) {
                return DataStatus::StopIterationNoBuffer;
            }
        }

        self.request_data_status()
    }

    /// Request trailers arrived; the body, if any, is complete.
    pub fn decode_trailers(&mut self) -> TrailersStatus {
        if self.txn.intervened() {
            return TrailersStatus::StopIteration;
        }
        if self.txn.request_processed() {
            return TrailersStatus::Continue;
        }

        self.txn.mark_request_processed();
        let verdict = self.txn.process_request_body();
        if self.intervene(verdict, Direction::Request) {
            return TrailersStatus::StopIteration;
        }
        TrailersStatus::Continue
    }

    /// Response headers arrived.
    pub fn encode_headers(&mut self, head: &response::Parts, end_stream: bool) -> HeadersStatus {
        if self.txn.intervened() || self.txn.response_processed() {
            return self.response_headers_status();
        }

        let flags = self.callbacks.route_flags();
        if flags.disable || flags.disable_response {
            tracing::debug!(txn = %self.txn.id(), "Response inspection disabled for route");
            self.txn.mark_response_processed();
            return HeadersStatus::Continue;
        }

        let protocol = Protocol::resolve(self.callbacks.protocol());
        let verdict = self
            .txn
            .process_response_headers(head.status.as_u16(), protocol, response_fields(head));
        if self.intervene(verdict, Direction::Response) {
            return HeadersStatus::StopIteration;
        }

        if end_stream {
            self.txn.mark_response_processed();
            let verdict = self.txn.process_response_body();
            if self.intervene(verdict, Direction::Response) {
                return HeadersStatus::StopIteration;
            }
        }

        self.response_headers_status()
    }

    /// A response body chunk arrived.
    pub fn encode_data(&mut self, data: &[u8], end_stream: bool) -> DataStatus {
        if self.txn.intervened() || self.txn.response_processed() {
            return self.response_data_status();
        }

        let appended = self.txn.append_response_body(data);
        let verdict = self.txn.poll_intervention();
        if self.intervene(verdict, Direction::Response) {
            return DataStatus::StopIterationNoBuffer;
        }

        let limit_reached = match appended {
            BodyAppend::Appended => false,
            BodyAppend::LimitReached => {
                metrics::record_body_limit(Direction::Response);
                true
            }
            // The body phase is already behind the transaction.
            BodyAppend::Closed => {
                self.txn.mark_response_processed();
                return self.response_data_status();
            }
        };

        if end_stream || limit_reached {
            self.txn.mark_response_processed();
            let verdict = self.txn.process_response_body();
            if self.intervene(verdict, Direction::Response) {
                return DataStatus::StopIterationNoBuffer;
            }
        }

        self.response_data_status()
    }

    pub fn encode_trailers(&mut self) -> TrailersStatus {
        if self.txn.intervened() || self.txn.response_processed() {
            return TrailersStatus::Continue;
        }

        self.txn.mark_response_processed();
        let verdict = self.txn.process_response_body();
        if self.intervene(verdict, Direction::Response) {
            return TrailersStatus::StopIteration;
        }
        TrailersStatus::Continue
    }

    /// Body chunk for either direction.
    pub fn on_data(&mut self, direction: Direction, data: &[u8], end_stream: bool) -> DataStatus {
        match direction {
            Direction::Request => self.decode_data(data, end_stream),
            Direction::Response => self.encode_data(data, end_stream),
        }
    }

    /// Trailers for either direction.
    pub fn on_trailers(&mut self, direction: Direction) -> TrailersStatus {
        match direction {
            Direction::Request => self.decode_trailers(),
            Direction::Response => self.encode_trailers(),
        }
    }

    /// Stream teardown. Runs the logging phase if it has not run yet.
    pub fn on_destroy(&mut self) {
        self.txn.process_logging();
    }

    /// Sends the blocking reply for a verdict the transaction just latched.
    /// Returns whether the transaction is intervened.
    fn intervene(&mut self, verdict: Option<Intervention>, direction: Direction) -> bool {
        if let Some(intervention) = verdict {
            tracing::info!(
                txn = %self.txn.id(),
                direction = direction.as_str(),
                status = intervention.status,
                "Transaction blocked"
            );
            metrics::record_intervention(direction);
            self.callbacks.send_local_reply(LocalReply::blocked(intervention));
        }
        self.txn.intervened()
    }

    fn engine_enabled(&self) -> bool {
        self.txn.rule_engine_mode() == RuleEngineMode::Enabled
    }

    fn request_headers_status(&self) -> HeadersStatus {
        if self.txn.intervened() {
            HeadersStatus::StopIteration
        } else if self.txn.request_processed() || !self.engine_enabled() {
            HeadersStatus::Continue
        } else {
            HeadersStatus::StopIteration
        }
    }

    fn request_data_status(&self) -> DataStatus {
        if self.txn.intervened() {
            DataStatus::StopIterationNoBuffer
        } else if self.txn.request_processed() || !self.engine_enabled() {
            DataStatus::Continue
        } else {
            DataStatus::StopIterationAndBuffer
        }
    }

    fn response_headers_status(&self) -> HeadersStatus {
        if self.txn.intervened() || self.txn.response_processed() || !self.engine_enabled() {
            HeadersStatus::Continue
        } else {
            HeadersStatus::StopIteration
        }
    }

    fn response_data_status(&self) -> DataStatus {
        if self.txn.intervened() || self.txn.response_processed() || !self.engine_enabled() {
            DataStatus::Continue
        } else {
            DataStatus::StopIterationAndBuffer
        }
    }
}
