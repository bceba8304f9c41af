//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for a request head
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order; first match wins
//! - Equal priorities keep configuration order

use axum::http::request::Parts;

use crate::config::{InspectionFlags, RouteConfig};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub backend_group: String,
    pub priority: u32,
    pub inspection: InspectionFlags,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_config(config: RouteConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Self {
            name: config.name,
            backend_group: config.backend_group,
            priority: config.priority,
            inspection: config.inspection,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, head: &Parts) -> bool {
        self.matcher.matches(head)
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs.into_iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes }
    }

    pub fn match_request(&self, head: &Parts) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(head))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
