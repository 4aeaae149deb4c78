//! HTTP transport
//!
//! Every `POST` body, on any path, is one complete audit message. It has no
//! syslog header of its own, so a synthetic one is attached: facility 1,
//! process name `http`, hostname = peer IP.
//!
//! # Responses
//!
//! | Status | When |
//! |--------|------|
//! | 200 | message accepted |
//! | 400 | empty or non-UTF-8 body (also raises an invalid event) |
//! | 405 | any method other than `POST` |
//! | 413 | body larger than `max_message_size` |
//! | 500 | the endpoint listener is gone |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atna_protocol::{
    InvalidMessageEvent, MessageEvent, SessionId, TransportEvent, decode_headerless,
};
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

use crate::common::{Lifecycle, TransportMetrics, TransportMetricsSnapshot};
use crate::config::{DEFAULT_FORWARD_TIMEOUT, EndpointConfig};
use crate::error::{Result, TransportError};
use crate::{Transport, TransportFactory};

/// Process name given to messages received over HTTP
const PROCESS_NAME: &str = "http";

// =============================================================================
// Handler
// =============================================================================

/// Shared state for the request handler
pub(crate) struct HttpState {
    pub endpoint: String,
    pub events: mpsc::Sender<TransportEvent>,
    pub metrics: Arc<TransportMetrics>,
    pub receiver: SocketAddr,
}

pub(crate) fn build_router(state: Arc<HttpState>, max_message_size: usize) -> Router {
    Router::new()
        .fallback(receive)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_message_size))
}

async fn receive(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.metrics.message_invalid();
            tracing::debug!(
                endpoint = %state.endpoint,
                peer = %peer,
                error = %rejection,
                "rejected HTTP body"
            );
            return rejection.into_response();
        }
    };

    state.metrics.bytes_read(body.len() as u64);

    let hostname = peer.ip().to_string();
    let (event, status) = match decode_headerless(&body, &hostname, PROCESS_NAME, SessionId::new())
    {
        Ok(message) => {
            state.metrics.message_received();
            tracing::trace!(
                endpoint = %state.endpoint,
                peer = %peer,
                bytes = body.len(),
                "message received"
            );
            let event = MessageEvent::new(message, peer, state.receiver);
            (TransportEvent::Message(event), StatusCode::OK)
        }
        Err(failure) => {
            state.metrics.message_invalid();
            tracing::debug!(
                endpoint = %state.endpoint,
                peer = %peer,
                error = %failure,
                "invalid message"
            );
            let event = InvalidMessageEvent::new(
                failure.partial,
                peer,
                state.receiver,
                failure.error.to_string(),
            );
            (TransportEvent::Invalid(event), StatusCode::BAD_REQUEST)
        }
    };

    if state.events.send(event).await.is_err() {
        state.metrics.error();
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    status.into_response()
}

// =============================================================================
// Transport
// =============================================================================

/// HTTP transport
pub struct HttpTransport {
    config: Arc<EndpointConfig>,
    client: reqwest::Client,
    metrics: Arc<TransportMetrics>,
    lifecycle: Lifecycle,
}

impl HttpTransport {
    /// `client` is used by `forward`
    pub fn new(config: Arc<EndpointConfig>, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            metrics: Arc::new(TransportMetrics::new()),
            lifecycle: Lifecycle::default(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn scheme(&self) -> &'static str {
        "http"
    }

    async fn start(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        if self.lifecycle.is_stopped() {
            return Ok(());
        }

        let bind_addr = self.config.bind_address()?;
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        self.lifecycle.started(local_addr);

        tracing::info!(
            endpoint = %self.config.name,
            transport = "http",
            address = %local_addr,
            "listening"
        );

        let state = Arc::new(HttpState {
            endpoint: self.config.name.clone(),
            events,
            metrics: Arc::clone(&self.metrics),
            receiver: local_addr,
        });
        let app = build_router(state, self.config.max_message_size)
            .into_make_service_with_connect_info::<SocketAddr>();

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(self.lifecycle.token().cancelled_owned())
            .await;

        self.lifecycle.finished();
        tracing::info!(
            endpoint = %self.config.name,
            transport = "http",
            "listener stopped"
        );

        result.map_err(TransportError::from)
    }

    fn stop(&self) {
        self.lifecycle.stop();
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        post(&self.client, target, raw).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.local_addr()
    }

    fn metrics(&self) -> TransportMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// POST raw bytes to `target`, failing on a non-2xx status
async fn post(client: &reqwest::Client, target: &Url, raw: Bytes) -> Result<()> {
    client
        .post(target.clone())
        .body(raw)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| TransportError::Http(e.to_string()))?;
    Ok(())
}

/// Factory for `http` endpoints and targets
#[derive(Debug, Clone)]
pub struct HttpFactory {
    client: reqwest::Client,
}

impl HttpFactory {
    /// Build the shared client with a per-request timeout
    pub fn new(forward_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(forward_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_default_timeout() -> Result<Self> {
        Self::new(DEFAULT_FORWARD_TIMEOUT)
    }
}

#[async_trait]
impl TransportFactory for HttpFactory {
    fn scheme(&self) -> &'static str {
        "http"
    }

    fn create(&self, config: Arc<EndpointConfig>) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(HttpTransport::new(config, self.client.clone())))
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        post(&self.client, target, raw).await
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
