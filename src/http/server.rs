//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Run every proxied request through an inspection session
//! - Forward requests to upstream backends
//! - Stop on the shutdown signal, draining in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::filter::{ConnectionInfo, InspectionConfig, InspectionFilter};
use crate::http::body::HoldError;
use crate::http::request::{request_id, upstream_request};
use crate::http::response::local_reply;
use crate::http::session::{PipelineCallbacks, Session};
use crate::load_balancer::BackendManager;
use crate::observability::metrics;
use crate::routing::Router as ProxyRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub backends: Arc<BackendManager>,
    pub client: Client<HttpConnector, Body>,
    pub inspection: Arc<InspectionConfig>,
    pub local_addr: SocketAddr,
}

/// HTTP server for the inspecting proxy.
pub struct HttpServer {
    config: ProxyConfig,
    router: Arc<ProxyRouter>,
    backends: Arc<BackendManager>,
    inspection: Arc<InspectionConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let router = Arc::new(ProxyRouter::from_config(config.routes.clone()));
        let backends = Arc::new(BackendManager::new(config.backends.clone()));
        let inspection = Arc::new(InspectionConfig::from_settings(&config.inspection, Arc::clone(&backends)));

        Self {
            config,
            router,
            backends,
            inspection,
        }
    }

    fn client(&self) -> Client<HttpConnector, Body> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(self.config.timeouts.connect_secs)));
        Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(self.config.timeouts.idle_secs))
            .build(connector)
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, routes = self.router.len(), "HTTP server starting");

        let state = AppState {
            router: Arc::clone(&self.router),
            backends: Arc::clone(&self.backends),
            client: self.client(),
            inspection: Arc::clone(&self.inspection),
            local_addr,
        };
        let app = Self::build_router(&self.config, state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Looks up the route, inspects the request, forwards it, inspects the
/// response.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let (head, body) = request.into_parts();
    let request_id = request_id(&head.headers);
    let method = head.method.to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %head.uri.path(),
        "Proxying request"
    );

    // 1. Match Route
    let Some(route) = state.router.match_request(&head) else {
        tracing::warn!(request_id = %request_id, path = %head.uri.path(), "No route matched");
        return finish(&method, (StatusCode::NOT_FOUND, "No matching route found").into_response(), start_time);
    };
    let backend_group = route.backend_group.clone();
    let flags = route.inspection;

    // 2. Inspect Request
    let callbacks = PipelineCallbacks::new(
        ConnectionInfo {
            downstream: peer,
            local: state.local_addr,
        },
        head.version,
        flags,
    );
    let session = Session::new(InspectionFilter::new(&state.inspection, request_id.clone(), callbacks));
    let upstream_body = match session.decode(&head, body).await {
        Ok(body) => body,
        Err(HoldError::Blocked) => return finish(&method, local_reply(&session), start_time),
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body failed");
            return finish(&method, (StatusCode::BAD_REQUEST, "Invalid request body").into_response(), start_time);
        }
    };

    // 3. Select Backend
    let Some(backend) = state.backends.get(&backend_group) else {
        tracing::warn!(request_id = %request_id, group = %backend_group, "No available backends");
        return finish(
            &method,
            (StatusCode::SERVICE_UNAVAILABLE, "No available backends").into_response(),
            start_time,
        );
    };

    // 4. Forward
    let upstream = match upstream_request(&head, backend.addr, &request_id, upstream_body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            return finish(
                &method,
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build upstream request").into_response(),
                start_time,
            );
        }
    };
    let response = match state.client.request(upstream).await {
        Ok(response) => response,
        // The request body was cut by an intervention while streaming.
        Err(_) if session.has_reply() => return finish(&method, local_reply(&session), start_time),
        Err(e) => {
            tracing::error!(request_id = %request_id, backend = %backend.addr, error = %e, "Upstream error");
            return finish(
                &method,
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response(),
                start_time,
            );
        }
    };
    drop(backend);

    // 5. Inspect Response
    let (head, body) = response.into_parts();
    let response = match session.encode(&head, Body::new(body)).await {
        Ok(body) => Response::from_parts(head, body),
        Err(HoldError::Blocked) => local_reply(&session),
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Upstream response body failed");
            (StatusCode::BAD_GATEWAY, "Upstream response failed").into_response()
        }
    };
    finish(&method, response, start_time)
}

fn finish(method: &str, response: Response, start_time: Instant) -> Response {
    metrics::record_request(method, response.status().as_u16(), start_time);
    response
}
