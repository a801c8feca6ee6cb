// src/server.rs
//! HTTP and websocket front end

use crate::{
    error::Result,
    gps::parse_rmc,
    publisher::Publisher,
    sink::{LatestReading, SocketSink},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    publisher: Publisher,
    latest: LatestReading,
    web_file: Option<PathBuf>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Subscribes a `LatestReading` so `GET /marker` has something to show.
    /// Must be called from within a tokio runtime.
    pub fn new(publisher: Publisher, web_file: Option<PathBuf>, shutdown: CancellationToken) -> Self {
        let latest = LatestReading::new();
        publisher.add_receiver(Arc::new(latest.clone()));
        Self {
            publisher,
            latest,
            web_file,
            shutdown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarkerForm {
    #[serde(rename = "Output", default)]
    output: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/marker", get(current_marker).post(update_marker))
        .route("/subscribe", get(subscribe))
        .route("/map", get(send_map))
        .with_state(state)
}

/// Serve on `addr` until the shutdown token fires
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "starting HTTP server");
    serve_listener(listener, state).await
}

pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn update_marker(State(state): State<AppState>, Form(form): Form<MarkerForm>) -> Response {
    match parse_rmc(&form.output) {
        Ok(reading) => {
            info!(position = %reading.format_position(), time = %reading.timestamp, "location update");
            if let Err(e) = state.publisher.publish(reading).await {
                error!(error = %e, "failed to publish reading");
                return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
            }
            (StatusCode::OK, "Location updated").into_response()
        }
        Err(e) => {
            if e.is_no_fix() {
                debug!("no fix yet");
            } else {
                warn!(error = %e, "rejected location update");
            }
            (StatusCode::BAD_REQUEST, format!("Error parsing gps output: {}", e)).into_response()
        }
    }
}

async fn current_marker(State(state): State<AppState>) -> Response {
    match state.latest.get() {
        Some(reading) => Json(reading).into_response(),
        None => (StatusCode::NOT_FOUND, "No location received yet").into_response(),
    }
}

async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| relay_socket(socket, state))
}

/// Stream readings to one websocket client until it goes away
async fn relay_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = socket.split();
    let sink = Arc::new(SocketSink::new(tx));
    let subscription = state.publisher.add_receiver(sink.clone());
    info!(id = %subscription.id(), "websocket client subscribed");

    loop {
        tokio::select! {
            _ = subscription.cancelled() => break,
            message = rx.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        }
    }

    subscription.remove();
    if let Err(e) = sink.close().await {
        debug!(error = %e, "websocket already closed");
    }
    info!(id = %subscription.id(), "websocket client left");
}

async fn send_map(State(state): State<AppState>) -> Response {
    let Some(path) = state.web_file.as_ref() else {
        return (StatusCode::NOT_FOUND, "No map configured").into_response();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read map page");
            (StatusCode::NOT_FOUND, "Map unavailable").into_response()
        }
    }
}
