//! Gateway configuration.

use std::time::Duration;

use crate::protocol::{IdentifyProperties, intents};

/// Default REST base used for endpoint discovery.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Delay policy between reconnect attempts.
///
/// The delay for attempt `n` (1-based) is
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`. The attempt
/// counter resets once a `Hello` is received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// Reconnect immediately, every time.
    ///
    /// Only safe when something outside the process already rate-limits
    /// restarts.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Everything the gateway connection needs to know up front.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Static credential sent in `Identify`.
    pub token: String,
    /// REST base for the discovery call.
    pub api_base: String,
    pub intents: u64,
    pub properties: IdentifyProperties,
    pub reconnect: ReconnectPolicy,
    /// Tear the connection down when a heartbeat comes due before the
    /// previous one was acknowledged.
    pub require_heartbeat_ack: bool,
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the credential.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            intents: intents::DIRECT_MESSAGES | intents::MESSAGE_CONTENT,
            properties: IdentifyProperties::default(),
            reconnect: ReconnectPolicy::default(),
            require_heartbeat_ack: false,
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("intents", &self.intents)
            .field("properties", &self.properties)
            .field("reconnect", &self.reconnect)
            .field("require_heartbeat_ack", &self.require_heartbeat_ack)
            .finish()
    }
}
