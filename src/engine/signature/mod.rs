//! Built-in signature engine.
//!
//! # Responsibilities
//! - Load rule sources (file path and/or inline text) at startup
//! - Evaluate compiled regex signatures per phase
//! - Enforce request/response body limits
//!
//! # Design Decisions
//! - Rule set is immutable once built and shared by `Arc` across workers
//! - A failing rule source is logged and skipped; startup continues with
//!   whatever loaded
//! - Blocking matches are reported at the logging phase, non-blocking ones
//!   immediately

pub mod ruleset;
pub mod transaction;

use std::path::Path;
use std::sync::Arc;

use crate::engine::{EngineTransaction, RuleMatchSink, VerdictEngine};
pub use ruleset::{LimitAction, RuleSet, RuleSetError};
pub use transaction::SignatureTransaction;

#[derive(Debug, Clone)]
pub struct SignatureEngine {
    rules: Arc<RuleSet>,
}

impl SignatureEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Build an engine from the configured rule sources.
    ///
    /// Each source is loaded independently; failures are logged and do not
    /// prevent the other source from loading.
    pub fn from_sources(rules_path: Option<&Path>, rules_inline: Option<&str>) -> Self {
        let mut rules = RuleSet::default();

        if let Some(path) = rules_path {
            tracing::debug!(path = %path.display(), "Loading inspection rules from file");
            match rules.load_file(path) {
                Ok(count) => tracing::info!(count, path = %path.display(), "Loaded rules"),
                Err(e) => tracing::error!(error = %e, "Failed to load rules"),
            }
        }

        if let Some(text) = rules_inline.filter(|t| !t.trim().is_empty()) {
            tracing::debug!("Loading inline inspection rules");
            match rules.load_inline(text) {
                Ok(count) => tracing::info!(count, "Loaded inline rules"),
                Err(e) => tracing::error!(error = %e, "Failed to load rules"),
            }
        }

        Self::new(rules)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

impl VerdictEngine for SignatureEngine {
    fn new_transaction(&self, sink: Arc<dyn RuleMatchSink>) -> Box<dyn EngineTransaction> {
        Box::new(SignatureTransaction::new(Arc::clone(&self.rules), sink))
    }
}
