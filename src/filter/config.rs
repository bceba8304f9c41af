//! Filter configuration shared by every transaction.

use std::sync::Arc;

use crate::config::InspectionSettings;
use crate::engine::signature::SignatureEngine;
use crate::engine::VerdictEngine;
use crate::filter::reporter::{DeliveryLog, MatchReporter, TransactionSink};
use crate::filter::transaction::Transaction;
use crate::load_balancer::BackendManager;
use crate::webhook::{DispatcherPool, WebhookEndpoint};

/// Immutable after construction. Owns the engine and the webhook
/// dispatcher pool; both go away when the last clone of the `Arc` holding
/// this is dropped.
pub struct InspectionConfig {
    engine: Arc<dyn VerdictEngine>,
    reporter: Arc<MatchReporter>,
}

impl InspectionConfig {
    pub fn new(engine: Arc<dyn VerdictEngine>, reporter: MatchReporter) -> Self {
        Self {
            engine,
            reporter: Arc::new(reporter),
        }
    }

    /// Builds the signature engine and the webhook pool from settings.
    ///
    /// Rule sources and the webhook are independent: a failure in one is
    /// logged and the filter runs with whatever was set up.
    pub fn from_settings(settings: &InspectionSettings, backends: Arc<BackendManager>) -> Self {
        let engine = SignatureEngine::from_sources(settings.rules_path.as_deref(), settings.rules_inline.as_deref());

        let webhooks = settings.webhook.as_ref().and_then(|webhook| {
            match WebhookEndpoint::from_config(webhook) {
                Ok(endpoint) => {
                    let uri = endpoint.uri().to_string();
                    let cluster = endpoint.cluster().to_string();
                    let pool = DispatcherPool::new(endpoint, backends, Arc::new(DeliveryLog), webhook.workers);
                    tracing::info!(uri = %uri, cluster = %cluster, workers = pool.len(), "Webhook enabled");
                    Some(Arc::new(pool))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Invalid webhook configuration, notifications disabled");
                    None
                }
            }
        });

        Self::new(Arc::new(engine), MatchReporter::new(webhooks))
    }

    pub fn reporter(&self) -> &MatchReporter {
        &self.reporter
    }

    /// Starts a transaction whose rule matches are reported under `id`.
    pub fn new_transaction(&self, id: impl Into<String>) -> Transaction {
        let id = id.into();
        let sink = Arc::new(TransactionSink::new(id.clone(), Arc::clone(&self.reporter)));
        Transaction::new(id, self.engine.new_transaction(sink))
    }
}
