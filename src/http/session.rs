//! Per-request inspection session.
//!
//! # Responsibilities
//! - Host one `InspectionFilter` for the lifetime of a proxied request
//! - Run the decode path on the request head and body
//! - Run the encode path on the upstream response head and body
//! - Keep the pending local reply until the handler sends it
//!
//! # Design Decisions
//! - The filter sits behind an `Arc<Mutex<_>>` because body wrappers polled
//!   by hyper feed it after the handler has returned; callbacks of one
//!   request are still strictly serial
//! - The filter, and with it the transaction, is dropped with the last
//!   body wrapper, which runs the logging phase

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Body;
use axum::http::{request, response, Version};

use crate::config::InspectionFlags;
use crate::filter::{ConnectionInfo, Direction, FilterCallbacks, HeadersStatus, InspectionFilter, LocalReply};
use crate::http::body::{hold, inspect, HoldError};

/// Pipeline side of the filter callbacks.
#[derive(Debug)]
pub struct PipelineCallbacks {
    connection: ConnectionInfo,
    protocol: Version,
    flags: InspectionFlags,
    reply: Option<LocalReply>,
}

impl PipelineCallbacks {
    pub fn new(connection: ConnectionInfo, protocol: Version, flags: InspectionFlags) -> Self {
        Self {
            connection,
            protocol,
            flags,
            reply: None,
        }
    }

    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    pub fn take_reply(&mut self) -> Option<LocalReply> {
        self.reply.take()
    }
}

impl FilterCallbacks for PipelineCallbacks {
    fn connection(&self) -> ConnectionInfo {
        self.connection
    }

    fn protocol(&self) -> Option<Version> {
        Some(self.protocol)
    }

    fn route_flags(&self) -> InspectionFlags {
        self.flags
    }

    fn send_local_reply(&mut self, reply: LocalReply) {
        if self.reply.is_some() {
            tracing::warn!(status = %reply.status, "Local reply already pending, ignoring");
            return;
        }
        self.reply = Some(reply);
    }
}

pub type SessionFilter = InspectionFilter<PipelineCallbacks>;

#[derive(Clone)]
pub struct Session(Arc<Mutex<SessionFilter>>);

impl Session {
    pub fn new(filter: SessionFilter) -> Self {
        Self(Arc::new(Mutex::new(filter)))
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionFilter> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock().transaction().id().to_string()
    }

    pub fn intervened(&self) -> bool {
        self.lock().transaction().intervened()
    }

    pub fn has_reply(&self) -> bool {
        self.lock().callbacks().has_reply()
    }

    pub fn take_reply(&self) -> Option<LocalReply> {
        self.lock().callbacks_mut().take_reply()
    }

    /// `Err(Blocked)` once a local reply is waiting to be sent.
    pub fn check_blocked(&self) -> Result<(), HoldError> {
        if self.has_reply() {
            return Err(HoldError::Blocked);
        }
        Ok(())
    }

    /// Request path. Returns the body to forward upstream.
    pub async fn decode(&self, head: &request::Parts, body: Body) -> Result<Body, HoldError> {
        let status = self.lock().decode_headers(head, http_body::Body::is_end_stream(&body));
        self.check_blocked()?;
        match status {
            HeadersStatus::StopIteration => hold(self, Direction::Request, body).await,
            HeadersStatus::Continue => Ok(inspect(self, Direction::Request, body)),
        }
    }

    /// Response path. Returns the body to send downstream.
    pub async fn encode(&self, head: &response::Parts, body: Body) -> Result<Body, HoldError> {
        let status = self.lock().encode_headers(head, http_body::Body::is_end_stream(&body));
        self.check_blocked()?;
        match status {
            HeadersStatus::StopIteration => hold(self, Direction::Response, body).await,
            HeadersStatus::Continue => Ok(inspect(self, Direction::Response, body)),
        }
    }
}
