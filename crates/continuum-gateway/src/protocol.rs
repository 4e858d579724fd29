//! Wire protocol for the gateway connection.
//!
//! Every frame is a JSON object `{op, t?, d, s?}`. Inbound frames are
//! parsed into [`GatewayFrame`]; outbound frames are built with
//! [`GatewayFrame::heartbeat`] and [`GatewayFrame::identify`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Intent bits requested in `Identify`.
pub mod intents {
    /// Direct-message events.
    pub const DIRECT_MESSAGES: u64 = 1 << 12;
    /// Message content on received events.
    pub const MESSAGE_CONTENT: u64 = 1 << 15;
}

/// Gateway opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// An application event (receive).
    Dispatch,
    /// Keep-alive (send; may also be requested by the server).
    Heartbeat,
    /// Session start (send only).
    Identify,
    /// Server asks the client to reconnect (receive).
    Reconnect,
    /// The session is no longer valid (receive).
    InvalidSession,
    /// First frame after connecting; carries the heartbeat interval.
    Hello,
    /// Acknowledges a heartbeat (receive).
    HeartbeatAck,
}

impl OpCode {
    /// Numeric value on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::Reconnect => 7,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
        }
    }

    /// Decode a wire value.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// One gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    /// Event type, present on dispatch frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
    /// Sequence number, present on dispatch frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
}

impl GatewayFrame {
    /// The decoded opcode, if known.
    #[must_use]
    pub const fn opcode(&self) -> Option<OpCode> {
        OpCode::from_code(self.op)
    }

    /// Heartbeat carrying the last seen sequence, or 0 if none.
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat.code(),
            t: None,
            d: Value::from(last_sequence.unwrap_or(0)),
            s: None,
        }
    }

    /// Identify payload with the static credential and intents.
    #[must_use]
    pub fn identify(token: &str, intents: u64, properties: &IdentifyProperties) -> Self {
        Self {
            op: OpCode::Identify.code(),
            t: None,
            d: json!({
                "token": token,
                "intents": intents,
                "properties": properties,
            }),
            s: None,
        }
    }
}

/// Payload of a `Hello` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat cadence in milliseconds.
    pub heartbeat_interval: u64,
}

/// Client properties sent with `Identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "continuum".to_string(),
            device: "continuum".to_string(),
        }
    }
}
