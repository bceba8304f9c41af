//! Inspecting reverse proxy library.
//!
//! Every proxied transaction is fed phase by phase to a verdict engine;
//! blocking verdicts are answered with a local reply, rule matches are
//! logged and optionally posted to a webhook.

pub mod config;
pub mod engine;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod routing;
pub mod webhook;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
