//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → routing (route, backend group, inspection flags)
//!     → session.rs decode path (body.rs holds or streams the body)
//!     → load balancer picks a backend, request.rs builds the upstream request
//!     → session.rs encode path on the upstream response
//!     → response.rs local reply when the filter blocked
//!     → Send to client
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod server;
pub mod session;

pub use request::X_REQUEST_ID;
pub use server::HttpServer;
pub use session::Session;
