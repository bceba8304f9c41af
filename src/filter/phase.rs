//! Inspection phases, traffic direction and protocol labels.

use std::fmt;

use axum::http::Version;

/// Inspection phase, in the order the engine sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Connection,
    Uri,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
    Logging,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connection => "connection",
            Phase::Uri => "uri",
            Phase::RequestHeaders => "request_headers",
            Phase::RequestBody => "request_body",
            Phase::ResponseHeaders => "response_headers",
            Phase::ResponseBody => "response_body",
            Phase::Logging => "logging",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the exchange a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Downstream to upstream (decode path).
    Request,
    /// Upstream to downstream (encode path).
    Response,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

/// HTTP protocol version as reported to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http10,
    #[default]
    Http11,
    Http2,
    Http3,
}

impl Protocol {
    pub fn from_version(version: Version) -> Option<Self> {
        match version {
            Version::HTTP_10 => Some(Protocol::Http10),
            Version::HTTP_11 => Some(Protocol::Http11),
            Version::HTTP_2 => Some(Protocol::Http2),
            Version::HTTP_3 => Some(Protocol::Http3),
            _ => None,
        }
    }

    /// Protocol of the stream, `1.1` when it cannot be determined.
    pub fn resolve(version: Option<Version>) -> Self {
        version.and_then(Self::from_version).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http10 => "1.0",
            Protocol::Http11 => "1.1",
            Protocol::Http2 => "2.0",
            Protocol::Http3 => "3.0",
        }
    }
}
