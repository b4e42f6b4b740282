// Dashboard push channel and the WebSocket handler on top of it

use crate::context::AppContext;
use crate::dispatcher::Delivery;
use crate::notifier::ParseMode;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const HUB_CAPACITY: usize = 64;

/// One server-to-dashboard message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardEvent {
    pub event: String,
    pub data: Value,
}

impl DashboardEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Fan-out to every connected dashboard. No acknowledgement and no
/// backpressure: a consumer that falls behind loses the oldest events.
#[derive(Debug, Clone)]
pub struct DashboardHub {
    tx: broadcast::Sender<DashboardEvent>,
}

impl DashboardHub {
    /// Create a new hub keeping up to `capacity` undelivered events per consumer
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of consumers the event was handed to
    pub fn publish(&self, event: &str, data: Value) -> usize {
        self.tx.send(DashboardEvent::new(event, data)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for DashboardHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

/// Commands a dashboard may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    SetMonitoring { enabled: bool },
    Clear,
    StartDetection,
    StopDetection,
    Status,
    TestTelegram,
    Ping,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let connection_id = Uuid::new_v4().to_string();
    info!("Dashboard connected: {}", connection_id);
    ctx.metrics.client_connected();

    let mut events = ctx.hub.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<DashboardEvent>();
    let (mut sender, mut receiver) = socket.split();

    // Initial state so the page can render before the first update
    let _ = reply_tx.send(DashboardEvent::new("status", json!(ctx.status())));

    let send_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(event) => event,
                    None => break,
                },
                broadcast = events.recv() => match broadcast {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Dashboard {} lagging, dropped {} events", send_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize dashboard event: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json)).await {
                warn!("Failed to send to dashboard {}: {}", send_id, e);
                break;
            }
        }
    });

    let recv_id = connection_id.clone();
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(command) => handle_command(&recv_ctx, command).await,
                        Err(e) => {
                            warn!("Invalid command from dashboard {}: {}", recv_id, e);
                            DashboardEvent::new("error", json!({ "error": format!("Invalid command: {}", e) }))
                        }
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Dashboard {} closed the connection", recv_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from {}: {}", recv_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task completed for {}", connection_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("Receive task completed for {}", connection_id);
            send_task.abort();
        }
    }

    ctx.metrics.client_disconnected();
    info!("Dashboard disconnected: {}", connection_id);
}

/// Apply a dashboard command and build the direct reply
pub async fn handle_command(ctx: &AppContext, command: ClientCommand) -> DashboardEvent {
    match command {
        ClientCommand::SetMonitoring { enabled } => {
            let status = ctx.set_monitoring(enabled);
            DashboardEvent::new("status", json!(status))
        }
        ClientCommand::Clear => {
            ctx.clear_history();
            DashboardEvent::new("status", json!(ctx.status()))
        }
        ClientCommand::StartDetection => match ctx.start_realtime().await {
            Ok(()) => DashboardEvent::new("detection_started", json!({ "status": "success" })),
            Err(e) => DashboardEvent::new("detection_error", json!({ "error": e.to_string() })),
        },
        ClientCommand::StopDetection => {
            let was_running = ctx.stop_realtime().await;
            DashboardEvent::new(
                "detection_stopped",
                json!({ "status": "success", "was_running": was_running }),
            )
        }
        ClientCommand::Status => DashboardEvent::new("status", json!(ctx.status())),
        ClientCommand::TestTelegram => {
            let queued = ctx.alerts.enqueue(Delivery::Text {
                text: "🧪 Test message from the PawSense dashboard".to_string(),
                mode: ParseMode::Plain,
            });
            if queued {
                DashboardEvent::new("telegram_test", json!({ "status": "success" }))
            } else {
                DashboardEvent::new(
                    "telegram_test",
                    json!({ "status": "error", "message": "Bot not available" }),
                )
            }
        }
        ClientCommand::Ping => DashboardEvent::new("pong", json!({})),
    }
}
