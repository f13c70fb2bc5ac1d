//! Per-connection task: handshake, registration, reader loop and writer task.

use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::engine::{EngineHandle, ServerEvent};
use crate::models::{Message, MessageType, Payload};
use crate::protocol::{error_codes, message_type, validate, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

pub(crate) const MAX_CONNECTIONS_REASON: &str = "Maximum connections reached";

/// Everything a connection task needs from the server.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub config: Arc<ServerConfig>,
    pub registry: ConnectionRegistry,
    pub engine: EngineHandle,
    pub events: broadcast::Sender<ServerEvent>,
    pub cancel: CancellationToken,
}

impl ConnectionContext {
    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

fn close_frame(code: CloseCode, reason: &'static str) -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    }))
}

fn send_response(outbound: &mpsc::UnboundedSender<WsMessage>, response: Response) {
    let _ = outbound.send(WsMessage::Text(response.to_json()));
}

/// Serve one accepted TCP stream until either side closes it.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnectionContext,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();

    let id = uuid::Uuid::new_v4().to_string();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

    if !ctx
        .registry
        .try_register(id.clone(), addr, outbound.clone(), ctx.config.max_connections)
    {
        log::warn!("Rejecting {}: {}", addr, MAX_CONNECTIONS_REASON);
        let _ = sink
            .send(close_frame(CloseCode::Policy, MAX_CONNECTIONS_REASON))
            .await;
        let _ = sink.close().await;
        ctx.emit(ServerEvent::ConnectionRejected {
            addr,
            reason: MAX_CONNECTIONS_REASON.to_string(),
        });
        return;
    }

    let count = ctx.registry.count();
    log::info!("Client {} connected from {} ({} open)", id, addr, count);
    ctx.emit(ServerEvent::ClientConnected {
        id: id.clone(),
        count,
    });

    // Writer: drains the outbound channel in order. A Close frame ends it.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let closing = matches!(frame, WsMessage::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let _ = outbound.send(close_frame(CloseCode::Away, "Server shutting down"));
                break;
            }
            frame = frames.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        ctx.registry.record_activity(&id);
                        if handle_text(&id, &text, &outbound, &ctx).await == Flow::Close {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        ctx.registry.record_activity(&id);
                        send_response(
                            &outbound,
                            Response::error(
                                MessageType::Error,
                                error_codes::MALFORMED_MESSAGE,
                                "Binary frames are not supported",
                            ),
                        );
                        let _ = outbound.send(close_frame(
                            CloseCode::Unsupported,
                            "Binary frames are not supported",
                        ));
                        break;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Connection {} failed: {}", id, e);
                        ctx.emit(ServerEvent::Error {
                            connection_id: Some(id.clone()),
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }

    ctx.registry.unregister(&id);
    drop(outbound);
    let _ = writer.await;

    let count = ctx.registry.count();
    log::info!("Client {} disconnected ({} open)", id, count);
    ctx.emit(ServerEvent::ClientDisconnected { id, count });
}

/// Parse, validate and dispatch one text frame.
async fn handle_text(
    id: &str,
    text: &str,
    outbound: &mpsc::UnboundedSender<WsMessage>,
    ctx: &ConnectionContext,
) -> Flow {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Malformed message from {}: {}", id, e);
            send_response(
                outbound,
                Response::error(
                    MessageType::Error,
                    error_codes::MALFORMED_MESSAGE,
                    format!("Invalid JSON: {}", e),
                ),
            );
            let _ = outbound.send(close_frame(CloseCode::Unsupported, "Invalid JSON"));
            return Flow::Close;
        }
    };

    let declared = match message_type(&value) {
        Ok(kind) => kind,
        Err(e) => {
            log::warn!("Unknown message type from {}: {}", id, e);
            send_response(
                outbound,
                Response::error(MessageType::Error, error_codes::UNKNOWN_MESSAGE_TYPE, e),
            );
            return Flow::Continue;
        }
    };

    let report = validate(&value, &ctx.config.validation);
    for warning in &report.warnings {
        log::warn!("Message from {}: {}", id, warning);
    }
    if !report.is_valid {
        log::warn!(
            "Rejected message from {}: {} (payload: {})",
            id,
            report.errors.join("; "),
            value.get("payload").unwrap_or(&Value::Null)
        );
        send_response(
            outbound,
            Response::error_with_details(
                declared.unwrap_or(MessageType::Error),
                error_codes::INVALID_MESSAGE,
                report.errors.join("; "),
                json!({ "errors": report.errors, "warnings": report.warnings }),
            ),
        );
        return Flow::Continue;
    }

    let message: Message = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Undecodable payload from {}: {}", id, e);
            send_response(
                outbound,
                Response::error(
                    declared.unwrap_or(MessageType::Error),
                    error_codes::INVALID_PAYLOAD,
                    e.to_string(),
                ),
            );
            return Flow::Continue;
        }
    };

    let kind = message.kind();
    log::debug!("Dispatching {} from {}", kind, id);

    match ctx.engine.apply(message).await {
        Ok(outcome) => {
            send_response(outbound, Response::success(kind, outcome.data));
            if outcome.mutated && ctx.config.broadcast_on_change {
                if let Err(e) = broadcast_state(&ctx.registry, &ctx.engine, &ctx.events).await {
                    log::warn!("State broadcast failed: {}", e);
                }
            }
        }
        Err(e) => {
            log::error!("Handler for {} failed: {}", kind, e);
            send_response(
                outbound,
                Response::error(kind, error_codes::HANDLER_FAILED, e.clone()),
            );
            ctx.emit(ServerEvent::Error {
                connection_id: Some(id.to_string()),
                message: e,
            });
        }
    }

    Flow::Continue
}

/// Build the STATE_UPDATED broadcast for the current context.
pub(crate) fn state_message(context: Value) -> Message {
    Message::new(Payload::StateUpdated(context)).with_source("server")
}

/// Broadcast the current context to every connection.
pub(crate) async fn broadcast_state(
    registry: &ConnectionRegistry,
    engine: &EngineHandle,
    events: &broadcast::Sender<ServerEvent>,
) -> Result<usize, String> {
    let context = engine.context().await?;
    let snapshot =
        serde_json::to_value(&context).map_err(|e| format!("Failed to encode context: {}", e))?;
    let text = serde_json::to_string(&state_message(snapshot))
        .map_err(|e| format!("Failed to encode broadcast: {}", e))?;

    let delivered = registry.broadcast_text(&text);
    let _ = events.send(ServerEvent::StateBroadcast { delivered });
    Ok(delivered)
}
