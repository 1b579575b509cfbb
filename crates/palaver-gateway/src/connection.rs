use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use palaver_types::events::RoomEvent;

use crate::dispatcher::Dispatcher;

/// Handle a room subscription over a WebSocket.
///
/// The socket is push-only from the server's point of view: outbound
/// messages are authored over HTTP, so inbound frames are drained just
/// to notice the client going away.
pub async fn handle_subscription(
    socket: WebSocket,
    dispatcher: Dispatcher,
    node_id: String,
    room_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut events = dispatcher.subscribe(&room_id);
    info!("WebSocket subscribed to room '{}'", room_id);

    let hello = RoomEvent::Subscribed {
        room_id: room_id.clone(),
        node_id,
    };
    if send_event(&mut sender, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Room '{}' subscriber lagged by {} events", room_id, n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    // Ignore pings/pongs/text; the socket is push-only.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!("WebSocket left room '{}'", room_id);
}

async fn send_event(
    sender: &mut (impl SinkExt<WsMessage> + Unpin),
    event: &RoomEvent,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Could not serialize room event: {}", e);
            return Err(());
        }
    };
    sender
        .send(WsMessage::Text(payload.into()))
        .await
        .map_err(|_| ())
}
