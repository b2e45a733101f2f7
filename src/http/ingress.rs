//! Axum ingress: every HTTP request becomes a queued request.
//!
//! # Responsibilities
//! - Rebuild the full request URL (configured scheme, `Host`, path and query)
//! - Deliver through the namespace and wait for the worker's reply
//! - Request IDs, tracing, body limit and request timeout as tower layers
//!
//! # Design Decisions
//! - Status for undeliverable requests comes from the kernel (404 no route,
//!   503 abandoned); a reply channel dropped without an answer is also 503

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::kernel::{deliver, Namespace, QueuedRequest};
use crate::lifecycle::Shutdown;

/// State shared by ingress handlers.
#[derive(Debug, Clone)]
pub struct IngressState {
    pub namespace: Arc<dyn Namespace>,
    pub scheme: String,
    pub max_body_bytes: usize,
}

/// Build the ingress router with all middleware layers.
///
/// The body limit wraps the timeout: a request that outlives `request_timeout`
/// is answered 408, an oversized one 413.
pub fn build_router(state: IngressState, request_timeout: Duration) -> Router {
    let max_body = state.max_body_bytes;
    Router::new().fallback(ingress_handler).with_state(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static("request-queue"),
            ))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)),
    )
}

/// Serve until `shutdown` is triggered, then finish open connections.
pub async fn serve(listener: TcpListener, router: Router, shutdown: Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Ingress listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    tracing::info!("Ingress stopped");
    Ok(())
}

async fn ingress_handler(State(state): State<IngressState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()));
    let Some(host) = host else {
        return (StatusCode::BAD_REQUEST, "missing Host header").into_response();
    };
    let path_and_query = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = match Url::parse(&format!("{}://{}{}", state.scheme, host, path_and_query)) {
        Ok(url) if url.host_str().is_some() => url,
        _ => return (StatusCode::BAD_REQUEST, "invalid Host header").into_response(),
    };

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response(),
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    let (queued, reply) = QueuedRequest::new(parts.method.as_str(), url, headers, body.to_vec());
    let request_id = queued.id();
    match deliver(state.namespace.as_ref(), queued) {
        Ok(delivery) => tracing::debug!(%request_id, queue = %delivery.queue, delegated = delivery.delegated, "Request queued"),
        Err(e) => tracing::debug!(%request_id, error = %e, "Request not queued"),
    }

    match reply.await {
        Ok(response) => response.into_response(),
        Err(_) => {
            tracing::warn!(%request_id, "Request dropped without a reply");
            (StatusCode::SERVICE_UNAVAILABLE, "request abandoned").into_response()
        }
    }
}
