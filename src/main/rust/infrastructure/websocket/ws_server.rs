use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{WebSocket, Ws};
use warp::Filter;

use super::protocol;
use super::ChannelNotifier;
use crate::application::services::SessionRegistry;
use crate::domain::ports::ClientNotifier;
use crate::domain::value_objects::{ClientEvent, ConnectionId, ErrorKind, ServerEvent};

const OUTBOUND_BUFFER: usize = 32;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /ws` upgrade route; every socket gets its own stream session.
pub fn relay_routes(
    registry: Arc<SessionRegistry>,
    max_message_bytes: usize,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let registry = warp::any().map(move || registry.clone());

    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(registry)
        .map(move |ws: Ws, registry: Arc<SessionRegistry>| {
            ws.max_message_size(max_message_bytes)
                .on_upgrade(move |socket| handle_connection(socket, registry))
        })
}

pub async fn handle_connection(socket: WebSocket, registry: Arc<SessionRegistry>) {
    let connection_id = ConnectionId::new();
    tracing::info!(%connection_id, "Socket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    let notifier = Arc::new(ChannelNotifier::new(out_tx));
    let session = registry.get_or_create(connection_id, notifier.clone()).await;

    let mut writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let message = match protocol::encode(&event) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(%connection_id, "Failed to encode {:?}: {}", event, e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(message).await {
                tracing::debug!(%connection_id, "Socket send failed: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%connection_id, "Socket error: {}", e);
                break;
            }
        };

        match protocol::decode(message) {
            Ok(Some(ClientEvent::Disconnect)) => break,
            Ok(Some(event)) => {
                if session.dispatch(event).await.is_err() {
                    tracing::warn!(%connection_id, "Session closed before the socket");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%connection_id, "Rejected client message: {}", e);
                notifier.notify(ServerEvent::error(ErrorKind::MalformedMessage, e.to_string()));
            }
        }
    }

    tracing::info!(%connection_id, "Socket disconnected");
    registry.disconnect(connection_id).await;

    // The writer ends once the session and this handler release their senders.
    drop(notifier);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
}
