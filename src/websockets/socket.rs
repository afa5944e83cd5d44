use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::debug;
use uuid::Uuid;

use super::connection_manager::ConnectionManager;
use super::messages::{MessageType, WebSocketMessage};

/// What the client sent, reduced to what the server cares about
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Text(String),
    /// Pong, ping or binary frames; they only count as liveness
    Heartbeat,
}

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Send a protocol-level ping frame
    async fn send_ping(&mut self) -> Result<(), SocketError>;

    /// Receive the next frame from the client (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<Inbound>, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for incoming text messages; the returned message is sent back to the client
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, connection_id: Uuid, message: String) -> Option<WebSocketMessage>;
}

#[derive(Debug)]
pub enum SocketError {
    ConnectionClosed,
    SendFailed(String),
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), SocketError> {
        self.send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<Inbound>, SocketError> {
        match self.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Inbound::Text(text))),
            Some(Ok(Message::Close(_))) => Ok(None),
            Some(Ok(_)) => Ok(Some(Inbound::Heartbeat)),
            Some(Err(e)) => Err(SocketError::ReceiveFailed(e.to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// Answers client PINGs and rejects anything else a viewer should not send
pub struct ViewerMessageHandler;

#[async_trait]
impl MessageHandler for ViewerMessageHandler {
    async fn handle_message(&self, connection_id: Uuid, message: String) -> Option<WebSocketMessage> {
        match serde_json::from_str::<WebSocketMessage>(&message) {
            Ok(ws_message) if ws_message.message_type == MessageType::Ping => {
                Some(WebSocketMessage::pong())
            }
            Ok(ws_message) => {
                debug!(
                    connection_id = %connection_id,
                    message_type = ?ws_message.message_type,
                    "Unsupported client message type"
                );
                Some(WebSocketMessage::error("Unsupported message type"))
            }
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                Some(WebSocketMessage::error("Malformed message"))
            }
        }
    }
}

/// Connection represents one viewer socket.
/// Outbound messages arrive from the connection manager on a bounded queue; every
/// inbound frame refreshes the connection's liveness.
pub struct Connection {
    pub connection_id: Uuid,
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::Receiver<String>,
    message_handler: Arc<dyn MessageHandler>,
    connection_manager: Arc<dyn ConnectionManager>,
    ping_interval: Duration,
}

impl Connection {
    pub fn new(
        connection_id: Uuid,
        socket: Box<dyn SocketWrapper>,
        outbound_receiver: mpsc::Receiver<String>,
        message_handler: Arc<dyn MessageHandler>,
        connection_manager: Arc<dyn ConnectionManager>,
        ping_interval: Duration,
    ) -> Self {
        Self {
            connection_id,
            socket,
            outbound_receiver,
            message_handler,
            connection_manager,
            ping_interval,
        }
    }

    /// Run the connection - handles sending, receiving and pings until disconnect
    pub async fn run(mut self) -> Result<(), SocketError> {
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);

        loop {
            tokio::select! {
                msg = self.outbound_receiver.recv() => {
                    match msg {
                        Some(message) => self.socket.send_message(message).await?,
                        // Unregistered by the manager
                        None => break,
                    }
                }

                msg = self.socket.receive_message() => {
                    match msg {
                        Ok(Some(inbound)) => {
                            self.connection_manager.touch(self.connection_id).await;
                            if let Inbound::Text(text) = inbound {
                                if let Some(reply) = self
                                    .message_handler
                                    .handle_message(self.connection_id, text)
                                    .await
                                {
                                    if let Ok(json) = serde_json::to_string(&reply) {
                                        self.socket.send_message(json).await?;
                                    }
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => return Err(e),
                    }
                }

                _ = ping.tick() => self.socket.send_ping().await?,
            }
        }

        let _ = self.socket.close().await;
        Ok(())
    }
}
