//! Rule-match reporting: logs, metrics and webhook notifications.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::engine::{RuleMatch, RuleMatchSink};
use crate::observability::metrics;
use crate::webhook::{DispatcherPool, FailureReason, WebhookCallback};

/// Reports rule matches of every transaction built from one configuration.
pub struct MatchReporter {
    webhooks: Option<Arc<DispatcherPool>>,
}

impl MatchReporter {
    pub fn new(webhooks: Option<Arc<DispatcherPool>>) -> Self {
        Self { webhooks }
    }

    /// Reporter that only logs.
    pub fn silent() -> Self {
        Self { webhooks: None }
    }

    pub fn webhooks(&self) -> Option<&Arc<DispatcherPool>> {
        self.webhooks.as_ref()
    }

    pub fn report(&self, txn: &str, record: Option<&RuleMatch>) {
        let Some(record) = record else {
            tracing::error!(txn = %txn, "Rule match callback invoked without a record");
            return;
        };

        tracing::info!(txn = %txn, "Rule Id: {} phase: {}", record.rule_id, record.phase);
        tracing::info!(
            txn = %txn,
            "* {} action. {}",
            if record.is_disruptive { "Disruptive" } else { "Non-disruptive" },
            record.log_line()
        );
        metrics::record_rule_match(record.is_disruptive);

        let Some(pool) = &self.webhooks else {
            return;
        };
        match record.render_json() {
            Ok(body) => pool.dispatcher().invoke(body),
            Err(e) => tracing::error!(txn = %txn, error = %e, "Failed to render rule match"),
        }
    }
}

/// Sink handed to one engine transaction.
pub struct TransactionSink {
    txn: String,
    reporter: Arc<MatchReporter>,
}

impl TransactionSink {
    pub fn new(txn: impl Into<String>, reporter: Arc<MatchReporter>) -> Self {
        Self {
            txn: txn.into(),
            reporter,
        }
    }
}

impl RuleMatchSink for TransactionSink {
    fn on_rule_match(&self, record: Option<&RuleMatch>) {
        self.reporter.report(&self.txn, record);
    }
}

/// Webhook outcomes are only logged and counted.
pub struct DeliveryLog;

impl WebhookCallback for DeliveryLog {
    fn on_success(&self, status: StatusCode) {
        tracing::info!(status = status.as_u16(), "webhook success");
        metrics::record_webhook("success");
    }

    fn on_failure(&self, reason: FailureReason) {
        tracing::info!(reason = %reason, "webhook failure");
        metrics::record_webhook(reason.as_str());
    }
}
