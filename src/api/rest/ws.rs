use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::driver::{Identity, ServiceCategory};
use crate::state::AppState;

/// Narrows the feed to one identity's notifications and/or one category's adverts.
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub identity: Option<Identity>,
    pub category: Option<ServiceCategory>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<EventFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    info!(identity = ?filter.identity, category = ?filter.category, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged; events skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if !event.visible_to(filter.identity.as_ref(), filter.category) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize dispatch event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
