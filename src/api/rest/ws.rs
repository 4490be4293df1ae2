use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::engine::tracking;
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.events_tx.subscribe();
    ws.on_upgrade(|socket| async move {
        info!("dashboard subscriber connected");
        forward(socket, rx, None::<DispatchEvent>, |event| Some(event.clone())).await;
        info!("dashboard subscriber disconnected");
    })
}

/// Public feed for one order. Unknown tokens are refused before the upgrade.
pub async fn tracking_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let (order_id, greeting) = tracking::subscribe(&state, &token)?;
    let rx = state.events_tx.subscribe();

    Ok(ws.on_upgrade(move |socket| async move {
        info!(order_id = %order_id, "tracking subscriber connected");
        forward(socket, rx, Some(greeting), move |event| {
            tracking::tracking_update(order_id, event)
        })
        .await;
        info!(order_id = %order_id, "tracking subscriber disconnected");
    }))
}

/// Sends `first`, then every event `select` keeps, until either side closes.
async fn forward<T, F>(
    socket: WebSocket,
    mut rx: Receiver<DispatchEvent>,
    first: Option<T>,
    select: F,
) where
    T: Serialize + Send + Sync + 'static,
    F: Fn(&DispatchEvent) -> Option<T> + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        if let Some(first) = first {
            if !send_json(&mut sender, &first).await {
                return;
            }
        }

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws subscriber lagging; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(message) = select(&event) else {
                continue;
            };
            if !send_json(&mut sender, &message).await {
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
}

/// False once the socket is gone.
async fn send_json<S, T>(sender: &mut S, message: &T) -> bool
where
    S: SinkExt<Message> + Unpin,
    T: Serialize,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize event for ws");
            return true;
        }
    };

    sender.send(Message::Text(json.into())).await.is_ok()
}
