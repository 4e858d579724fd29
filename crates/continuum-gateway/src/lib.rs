//! Gateway connection manager.
//!
//! Provides:
//! - Wire protocol (opcodes, frames, identify/heartbeat payloads)
//! - `SequenceTracker` / `HeartbeatScheduler` - state persisted across restarts
//! - `DispatchRouter` - forwards qualifying direct messages to the session layer
//! - `GatewayConnection` - the connect/handshake/heartbeat/reconnect state machine
//! - WebSocket transport with endpoint discovery (feature: websocket)

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod heartbeat;
pub mod protocol;
pub mod sequence;
pub mod transport;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use config::{GatewayConfig, ReconnectPolicy};
pub use connection::{ConnectionState, GatewayConnection, GatewayError};
pub use dispatch::{DirectMessage, DispatchRouter, SessionHandler};
pub use heartbeat::HeartbeatScheduler;
pub use protocol::{GatewayFrame, OpCode};
pub use sequence::SequenceTracker;
pub use transport::{Connector, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
