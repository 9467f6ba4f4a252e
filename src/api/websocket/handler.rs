//! WebSocket connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::*;

use super::state::AppState;
use crate::hub::Hub;
use crate::protocol::codec;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Serve one WebSocket connection until either side closes it
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (id, mut outbox) = hub.accept();
    let (mut sink, mut stream) = socket.split();

    // Writer: drains the outbox in order. Ends when the hub drops the
    // connection or the socket breaks.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let frame = match codec::encode(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => hub.handle_frame(id, &text).await,
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame from {}", id);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Receive error on {}: {}", id, e);
                        break;
                    }
                }
            }

            // Writer finished: socket broken or hub shut down
            _ = &mut writer => break,
        }
    }

    writer.abort();
    hub.disconnect(id).await;
}
