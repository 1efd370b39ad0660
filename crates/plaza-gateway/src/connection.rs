use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use plaza_types::events::{ClientCommand, ServerEvent};

use crate::relay::Relay;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one gateway WebSocket until either side goes away.
///
/// Outbound traffic (broadcasts, targeted events, heartbeat) runs in its own
/// task; inbound commands are handled here one at a time, so a connection's
/// commands are processed in arrival order.
pub async fn handle_connection(socket: WebSocket, relay: Relay) {
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut outbox) = relay.open_session();
    let conn_id = session.connection().id();
    info!("Connection {} opened", conn_id);

    let mut broadcast_rx = relay.dispatcher().subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event = tokio::select! {
                result = broadcast_rx.recv() => match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Connection {} lagged by {} broadcasts", conn_id, n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                result = outbox.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Connection {} heartbeat timeout, dropping", conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if !send_event(&mut sender, &event).await {
                break;
            }
        }
    });

    let recv_loop = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => relay.handle_command(&mut session, cmd).await,
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_received.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    // Wait for either side to finish
    tokio::select! {
        _ = &mut send_task => {}
        _ = recv_loop => {}
    }
    send_task.abort();

    relay.handle_disconnect(&mut session).await;
    debug!("Connection {} finished", conn_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            true
        }
    }
}
