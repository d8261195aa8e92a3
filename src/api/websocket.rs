use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt as _;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::models_ws::{WsClientMessage, WsServerMessage};
use crate::app::AppState;

/// Pushes the message list and the composing flag on every change, and
/// accepts sends and clears from the client.
#[get("/ws/chat")]
pub async fn ws_chat(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let state = state.get_ref().clone();

    info!("WebSocket connection established");

    actix_web::rt::spawn(async move {
        let orchestrator = state.orchestrator.clone();
        let mut messages_rx = orchestrator.subscribe_messages();
        let mut composing_rx = orchestrator.subscribe_composing();

        let initial = [
            WsServerMessage::Messages {
                messages: orchestrator.snapshot(),
            },
            WsServerMessage::Composing {
                composing: orchestrator.is_composing(),
            },
        ];
        for msg in &initial {
            if push(&mut session, msg).await.is_err() {
                return;
            }
        }

        loop {
            let outgoing = tokio::select! {
                incoming = msg_stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state, &session);
                        continue;
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(reason))) => {
                        let _ = session.close(reason).await;
                        info!("WebSocket connection closed");
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => break,
                },
                update = messages_rx.recv() => match update {
                    Ok(messages) => WsServerMessage::Messages { messages },
                    // Only the latest list matters
                    Err(RecvError::Lagged(_)) => WsServerMessage::Messages {
                        messages: orchestrator.snapshot(),
                    },
                    Err(RecvError::Closed) => break,
                },
                update = composing_rx.recv() => match update {
                    Ok(composing) => WsServerMessage::Composing { composing },
                    Err(RecvError::Lagged(_)) => WsServerMessage::Composing {
                        composing: orchestrator.is_composing(),
                    },
                    Err(RecvError::Closed) => break,
                },
            };

            if push(&mut session, &outgoing).await.is_err() {
                // Client likely disconnected
                break;
            }
        }

        info!("WebSocket connection closed");
    });

    Ok(response)
}

fn handle_client_message(text: &str, state: &AppState, session: &actix_ws::Session) {
    let msg = match serde_json::from_str::<WsClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed WebSocket message");
            return;
        }
    };

    match msg {
        WsClientMessage::Message { content } => {
            let orchestrator = state.orchestrator.clone();
            let mut session = session.clone();
            // Run the send apart from the socket loop so pushes keep flowing meanwhile
            actix_web::rt::spawn(async move {
                if let Err(e) = orchestrator.send(&content).await {
                    warn!(error = %e, "WebSocket send failed");
                    let reply = WsServerMessage::Error {
                        content: e.user_message(),
                    };
                    let _ = push(&mut session, &reply).await;
                }
            });
        }
        WsClientMessage::Clear => state.orchestrator.clear(),
    }
}

async fn push(session: &mut actix_ws::Session, msg: &WsServerMessage) -> Result<(), actix_ws::Closed> {
    let payload = match serde_json::to_string(msg) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Could not encode WebSocket message");
            return Ok(());
        }
    };
    session.text(payload).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_chat);
}
