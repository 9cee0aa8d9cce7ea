use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_types::events::{GatewayCommand, GatewayEvent};

use crate::broker::Broker;
use crate::error::BrokerError;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Longest prefix of a rejected inbound frame echoed into logs.
const FRAME_PREVIEW_BYTES: usize = 200;

/// Truncate a frame for logging without splitting a multibyte character.
fn frame_preview(text: &str) -> &str {
    if text.len() <= FRAME_PREVIEW_BYTES {
        return text;
    }
    let mut end = FRAME_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Handle a single WebSocket connection for its whole lifetime. Registers
/// the connection, pumps registry-delivered events out and parsed commands
/// in, and runs full cleanup exactly once when either direction ends.
pub async fn handle_connection(socket: WebSocket, broker: Broker) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut events_rx) = broker.registry().register().await;
    info!(%conn_id, "client connected");

    // Shared flag for heartbeat: recv task flips it on Pong
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broker events -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(%conn_id, "heartbeat timeout, dropping connection");
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Parse and dispatch inbound commands
    let recv_broker = broker.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_broker, conn_id, cmd).await,
                    Err(e) => {
                        warn!(%conn_id, "bad command: {} -- raw: {}", e, frame_preview(&text));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broker.disconnect(conn_id).await;
    info!(%conn_id, "client disconnected");
}

/// Route one inbound command. Failures are reported to the originating
/// connection only, as a `message-error` event; other members observe
/// nothing.
pub async fn handle_command(broker: &Broker, conn_id: Uuid, cmd: GatewayCommand) {
    let result = match cmd {
        GatewayCommand::Identify { user_id } => match broker.identify(conn_id, user_id).await {
            Ok(user) => {
                broker
                    .fanout()
                    .send_to(
                        conn_id,
                        GatewayEvent::Ready {
                            user_id,
                            display_name: user.display_name,
                        },
                    )
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        },

        GatewayCommand::JoinGroup { group_id } => broker.registry().join(conn_id, group_id).await,

        GatewayCommand::LeaveGroup { group_id } => broker.registry().leave(conn_id, group_id).await,

        GatewayCommand::SendMessage {
            group_id,
            text,
            anonymous,
        } => broker
            .send_message(conn_id, group_id, &text, anonymous)
            .await
            .map(|_| ()),

        GatewayCommand::Typing {
            group_id,
            is_typing,
            display_name,
        } => broker.typing(conn_id, group_id, is_typing, display_name).await,
    };

    if let Err(e) = result {
        debug!(%conn_id, error = %e, "command failed");
        report_error(broker, conn_id, e).await;
    }
}

async fn report_error(broker: &Broker, conn_id: Uuid, error: BrokerError) {
    broker
        .fanout()
        .send_to(
            conn_id,
            GatewayEvent::MessageError {
                error: error.to_string(),
            },
        )
        .await;
}
