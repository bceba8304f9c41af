//! Fire-and-forget webhook delivery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::load_balancer::BackendManager;
use crate::webhook::signing::{SIGNATURE_HEADER, SIGNATURE_TYPE, SIGNATURE_TYPE_HEADER};
use crate::webhook::{FailureReason, WebhookCallback, WebhookEndpoint, WebhookError};

pub struct WebhookDispatcher {
    client: Client<HttpConnector, Body>,
    endpoint: Arc<WebhookEndpoint>,
    backends: Arc<BackendManager>,
    callback: Arc<dyn WebhookCallback>,
}

impl WebhookDispatcher {
    pub fn new(
        endpoint: Arc<WebhookEndpoint>,
        backends: Arc<BackendManager>,
        callback: Arc<dyn WebhookCallback>,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            endpoint,
            backends,
            callback,
        }
    }

    pub fn endpoint(&self) -> &WebhookEndpoint {
        &self.endpoint
    }

    /// POST request carrying `body` to the cluster member at `target`.
    pub fn build_request(&self, target: SocketAddr, body: String) -> Result<Request<Body>, WebhookError> {
        let uri = format!("http://{}{}", target, self.endpoint.path_and_query());
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, self.endpoint.authority())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len());

        if let Some(signature) = self.endpoint.sign(body.as_bytes()) {
            builder = builder
                .header(SIGNATURE_TYPE_HEADER, SIGNATURE_TYPE)
                .header(SIGNATURE_HEADER, signature);
        }

        Ok(builder.body(Body::from(body))?)
    }

    /// Sends `body` in the background. Returns immediately; the outcome is
    /// reported to the callback.
    pub fn invoke(&self, body: String) {
        let Some(target) = self.backends.get(self.endpoint.cluster()) else {
            tracing::error!(
                cluster = %self.endpoint.cluster(),
                "Webhook can't be invoked, cluster not found or has no available member"
            );
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("Webhook can't be invoked outside of a runtime");
            return;
        };

        let request = match self.build_request(target.addr, body) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Webhook request could not be built");
                return;
            }
        };

        tracing::debug!(uri = %self.endpoint.uri(), backend = %target.addr, "Webhook: start");

        let client = self.client.clone();
        let callback = Arc::clone(&self.callback);
        let timeout = self.endpoint.timeout();
        runtime.spawn(async move {
            // The connection slot is held until the delivery completes.
            let _slot = target;
            match deliver(&client, request, timeout).await {
                Ok(status) if status == StatusCode::OK => {
                    tracing::debug!("Webhook: success");
                    callback.on_success(status);
                }
                Ok(status) => {
                    tracing::debug!(status = status.as_u16(), "Webhook: unexpected response status");
                    callback.on_failure(FailureReason::BadHttpStatus(status.as_u16()));
                }
                Err(reason) => callback.on_failure(reason),
            }
        });
    }
}

async fn deliver(
    client: &Client<HttpConnector, Body>,
    request: Request<Body>,
    timeout: Duration,
) -> Result<StatusCode, FailureReason> {
    match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => Ok(response.status()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Webhook: network error");
            Err(FailureReason::Network)
        }
        Err(_) => {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Webhook: timed out");
            Err(FailureReason::Timeout)
        }
    }
}
