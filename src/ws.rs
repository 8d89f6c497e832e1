//! `/ws` endpoint: upgrades browsers to a duplex channel and parks them in the registry.
//!
//! The server never reads application data from a channel. The read loop exists only to notice
//! when the peer goes away so the registry entry can be dropped.

use crate::{
    registry::{ConnectionRegistry, WebSocketSink},
    server::AppState,
};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;

/// GET /ws
pub async fn ws_upgrade(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!("Failed to upgrade to WebSocket: {}", rejection);
            return rejection.into_response();
        }
    };
    ws.on_failed_upgrade(|error| {
        tracing::warn!("Failed to upgrade to WebSocket: {}", error);
    })
    .on_upgrade(move |socket| handle_socket(socket, state.registry))
}

async fn handle_socket(socket: WebSocket, registry: ConnectionRegistry<WebSocketSink>) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, &registry).await;
}

/// Register `sink`, then drain `stream` until the peer closes or the transport fails, and
/// finally deregister and close the channel.
pub async fn run_connection<S, St, E>(sink: S, mut stream: St, registry: &ConnectionRegistry<S>)
where
    S: Sink<Message> + Unpin + Send,
    S::Error: fmt::Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let id = registry.add(sink).await;
    tracing::info!("[WebSocket] {} connected", id);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                tracing::debug!("[WebSocket] {} sent close", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("[WebSocket] {} read error: {}", id, e);
                break;
            }
        }
    }

    // A failed broadcast may already have closed and removed it.
    if let Some(mut sink) = registry.remove(id).await {
        if let Err(e) = sink.close().await {
            tracing::debug!("[WebSocket] {} close failed: {}", id, e);
        }
    }
    tracing::info!("[WebSocket] {} disconnected", id);
}
