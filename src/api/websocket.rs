//! WebSocket handler for the telemetry stream

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{api::state::ApiState, dispatcher::Dispatcher, subscriptions::ClientId};

/// Frames a client may send
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Replace the client's topics
    Subscribe { topics: Vec<String> },
    Unsubscribe,
}

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state.dispatcher))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let (client, mut outbound) = dispatcher.connect().await;

    let (mut sender, mut receiver) = socket.split();

    // Forward queued topic messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = message.to_json().to_string();
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("{client}: send failed, client disconnected");
                break;
            }
        }
    });

    let recv_dispatcher = Arc::clone(&dispatcher);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_text(&recv_dispatcher, client, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    dispatcher.disconnect(client).await;
    info!("{client} websocket closed");
}

async fn handle_text(dispatcher: &Dispatcher, client: ClientId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { topics }) => {
            // rejections are logged by the dispatcher
            let _ = dispatcher.subscribe(client, &topics).await;
        }
        Ok(ClientMessage::Unsubscribe) => dispatcher.unsubscribe(client).await,
        Err(e) => warn!("{client}: ignoring unparsable frame: {e}"),
    }
}
