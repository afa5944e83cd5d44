// Public API
pub use connection_manager::{ConnectionManager, ConnectionManagerHandle, Registration};
pub use handler::websocket_handler;
pub use messages::{MessageType, WebSocketMessage};
pub use socket::{Connection, MessageHandler, SocketWrapper};

// Internal modules
mod connection_manager;
mod handler;
mod messages;
mod socket;
