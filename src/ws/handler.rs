//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{EntityId, PredictedState};
use crate::server::SessionEvent;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let entity_id = EntityId::new();
    info!(entity_id = %entity_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before joining so the spawn broadcast is not missed
    let state_rx = state.authority.subscribe();

    let spawn = match join(&state, entity_id).await {
        Ok(spawn) => spawn,
        Err(message) => {
            error!(entity_id = %entity_id, error = %message, "Failed to spawn entity");
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::Error {
                    code: "join_failed".to_string(),
                    message,
                },
            )
            .await;
            return;
        }
    };

    state.sessions.insert(entity_id);

    let welcome = ServerMsg::Welcome {
        entity_id,
        tick_rate: state.config.simulation.tick_rate,
        tick: spawn.tick,
        move_speed: state.config.simulation.move_speed,
        spawn,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(entity_id = %entity_id, error = %e, "Failed to send welcome");
    } else {
        run_session(entity_id, &state, ws_sink, ws_stream, state_rx).await;
    }

    // Cleanup on disconnect
    let _ = state
        .authority
        .event_tx
        .send(SessionEvent::Leave { entity_id })
        .await;
    state.sessions.remove(&entity_id);

    info!(entity_id = %entity_id, "WebSocket connection closed");
}

/// Ask the tick loop to spawn the session's entity
async fn join(state: &AppState, entity_id: EntityId) -> Result<PredictedState, String> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .authority
        .event_tx
        .send(SessionEvent::Join {
            entity_id,
            reply: reply_tx,
        })
        .await
        .map_err(|_| "authority loop stopped".to_string())?;

    reply_rx
        .await
        .map_err(|_| "authority loop stopped".to_string())?
        .map_err(|e| e.to_string())
}

/// Run the WebSocket session with read/write split
async fn run_session(
    entity_id: EntityId,
    state: &AppState,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut state_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = SessionRateLimiter::new(state.config.simulation.input_rate_limit);
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMsg>(16);

    // Writer task: authoritative broadcasts and direct replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                received = state_rx.recv() => match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Skipped states are harmless: the next one supersedes them
                        warn!(entity_id = %entity_id, lagged_count = n, "Client lagged, skipping {} states", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(entity_id = %entity_id, "State channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(entity_id = %entity_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> tick loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Input { input }) => {
                    if !rate_limiter.check_input() {
                        state.sessions.record_limited(&entity_id);
                        warn!(entity_id = %entity_id, tick = %input.tick(), "Rate limited input message");
                        continue;
                    }

                    let event = SessionEvent::Input { entity_id, input };
                    if state.authority.event_tx.send(event).await.is_err() {
                        debug!(entity_id = %entity_id, "Event channel closed");
                        break;
                    }
                }
                Ok(ClientMsg::Ping { t }) => {
                    let _ = reply_tx.send(ServerMsg::Pong { t }).await;
                }
                Err(e) => {
                    warn!(entity_id = %entity_id, error = %e, "Failed to parse client message");
                    let _ = reply_tx
                        .send(ServerMsg::Error {
                            code: "bad_message".to_string(),
                            message: e.to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(entity_id = %entity_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(entity_id = %entity_id, "Received control frame");
            }
            Ok(Message::Close(_)) => {
                info!(entity_id = %entity_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
