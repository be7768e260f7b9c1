//! WebSocket turn relay.
//!
//! One socket drives one session: action messages come in, and the same
//! response object the POST action endpoint returns goes back out after
//! each turn.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use loremaster_domain::SessionId;

use crate::app::App;
use crate::use_cases::quest_log::QuestUpdate;
use crate::use_cases::turn::TurnError;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Action {
        message: String,
        character: Option<String>,
        #[serde(default)]
        voice: bool,
    },
    Reset,
    Heartbeat,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Narrative {
        narrative: String,
        audio_url: Option<String>,
        game_state: Value,
        tool_results: Vec<Value>,
        quest_updates: Vec<QuestUpdate>,
    },
    Reset,
    Error { code: String, message: String },
    Pong,
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(app): State<Arc<App>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app, SessionId::from(id)))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, app: Arc<App>, session_id: SessionId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);

    tracing::info!(
        connection_id = %connection_id,
        session_id = %session_id,
        "WebSocket connection established"
    );

    // Forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    let response = handle_message(msg, &app, session_id).await;
                    if tx.try_send(response).is_err() {
                        tracing::warn!(
                            connection_id = %connection_id,
                            "Failed to send response, channel full or closed"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                    let error = ServerMessage::Error {
                        code: "PARSE_ERROR".to_string(),
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = tx.try_send(error);
                }
            },
            Ok(Message::Ping(_)) => {
                let _ = tx.try_send(ServerMessage::Pong);
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed client message. Every inbound message gets a reply.
async fn handle_message(msg: ClientMessage, app: &App, session_id: SessionId) -> ServerMessage {
    match msg {
        ClientMessage::Heartbeat => ServerMessage::Pong,
        ClientMessage::Action {
            message,
            character,
            voice,
        } => run_action(app, session_id, &message, character.as_deref(), voice).await,
        ClientMessage::Reset => match app.registry.get(session_id) {
            Some(handle) => {
                handle.lock().await.reset_conversation();
                ServerMessage::Reset
            }
            None => unknown_session(session_id),
        },
    }
}

async fn run_action(
    app: &App,
    session_id: SessionId,
    message: &str,
    character: Option<&str>,
    voice: bool,
) -> ServerMessage {
    let Some(handle) = app.registry.get(session_id) else {
        return unknown_session(session_id);
    };
    if let Some(character) = character {
        tracing::debug!(session_id = %session_id, character, "Action attributed to character");
    }
    let mut session = handle.lock().await;

    match app
        .agent
        .run_turn(&mut session, message, voice, app.clock.now())
        .await
    {
        Ok(outcome) => ServerMessage::Narrative {
            narrative: outcome.narrative,
            audio_url: outcome.audio_url,
            game_state: outcome.game_state,
            tool_results: outcome.tool_results,
            quest_updates: outcome.quest_updates,
        },
        Err(TurnError::EmptyMessage) => ServerMessage::Error {
            code: "EMPTY_MESSAGE".to_string(),
            message: "Player message is empty".to_string(),
        },
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Turn failed");
            ServerMessage::Error {
                code: "TURN_FAILED".to_string(),
                message: e.to_string(),
            }
        }
    }
}

fn unknown_session(session_id: SessionId) -> ServerMessage {
    ServerMessage::Error {
        code: "UNKNOWN_SESSION".to_string(),
        message: format!("No session with id {session_id}"),
    }
}
