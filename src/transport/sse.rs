//! Server-sent events endpoint plus the summary and health routes.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::guard::ClientGuard;
use super::message::StreamQuery;
use crate::broker::{BrokerConsumerPool, FleetSummary, StreamEvent};
use crate::client::StreamClient;
use crate::utils::error::ServerError;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BrokerConsumerPool>,
    pub keepalive: Duration,
    pub client_buffer: usize,
}

impl AppState {
    pub fn new(pool: Arc<BrokerConsumerPool>, keepalive: Duration, client_buffer: usize) -> Self {
        Self {
            pool,
            keepalive,
            client_buffer,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", get(stream_events))
        .route("/api/summary", get(summary))
        .route("/health", get(health))
        .with_state(state)
}

fn sse_event(event: &StreamEvent) -> Event {
    Event::default().event(event.name()).data(event.data())
}

async fn stream_events(State(state): State<AppState>, Query(query): Query<StreamQuery>) -> Response {
    let topics = state.pool.topics().parse_interest(query.topics.as_deref());
    let (tx, rx) = mpsc::channel(state.client_buffer.max(1));
    let client = StreamClient::new(tx, topics);
    let client_id = client.id.clone();

    if let Err(e) = state.pool.register(client) {
        warn!(client_id = %client_id, error = %e, "rejecting stream");
        return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
    }

    // The guard lives as long as the response body; dropping the body, or
    // the registry dropping our sender, removes the client.
    let guard = ClientGuard::new(state.pool.clone(), client_id);
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(sse_event(&event)), (rx, guard)))
    });

    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.keepalive)
            .text("keepalive"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}

async fn summary(State(state): State<AppState>) -> Json<FleetSummary> {
    Json(state.pool.summary())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "upstream": state.pool.state(),
        "clients": state.pool.client_count(),
    }))
}

/// Serves the HTTP routes on an already bound listener.
pub async fn serve_http(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub async fn start_http_server(addr: &str, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!("HTTP server listening on http://{}", addr);
    serve_http(listener, state).await
}
