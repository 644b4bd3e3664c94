use crate::models::{District, ResultRecord};
use crate::sync::SyncService;
use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use log::{debug, error};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

const STATUS_TEXT: &str = "Election Server Running\n";

pub fn router(service: Arc<SyncService>) -> Router {
    Router::new()
        .route("/", get(status_or_upgrade))
        .route("/ws", get(websocket_handler))
        .route("/api/districts", get(districts))
        .route("/api/results", get(results).post(submit_result))
        .route("/api/summary", get(summary))
        .with_state(service)
}

/// Plain GETs get the status line; upgrade requests become observer sockets,
/// so clients may connect at the bare host as well as at `/ws`.
async fn status_or_upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(service): State<Arc<SyncService>>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, service)),
        Err(_) => STATUS_TEXT.into_response(),
    }
}

async fn districts(State(service): State<Arc<SyncService>>) -> Json<Vec<District>> {
    Json(service.districts().to_vec())
}

async fn results(State(service): State<Arc<SyncService>>) -> Json<Vec<ResultRecord>> {
    Json(service.results().await)
}

/// Same path as a socket `submit`. The reply is 204 whether or not the
/// report was accepted.
async fn submit_result(State(service): State<Arc<SyncService>>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => service.submit_payload(payload).await,
        Err(e) => debug!("Dropping unparseable POST /api/results body: {}", e),
    }
    StatusCode::NO_CONTENT
}

async fn summary(State(service): State<Arc<SyncService>>) -> impl IntoResponse {
    match service.summary().await {
        Ok(view) => Json(view).into_response(),
        Err(e) => {
            error!("Failed to build summary: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<SyncService>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(socket: WebSocket, service: Arc<SyncService>) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut frames) = mpsc::unbounded_channel();

    // Writer: drains this connection's outbox into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!("WS send failed, closing writer: {}", e);
                break;
            }
        }
    });

    let id = service.connect(outbox).await;

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => service.handle_frame(id, text.as_str()).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => service.handle_frame(id, text).await,
                Err(_) => debug!("Dropping non-UTF-8 binary frame from {}", id),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WS read error on {}: {}", id, e);
                break;
            }
        }
    }

    service.disconnect(id).await;
    writer.abort();
}
