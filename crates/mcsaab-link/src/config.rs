use std::time::Duration;

use mcsaab_frame::{FrameConfig, DEFAULT_RX_CAPACITY, PROTO_BYTE, PROTO_PKT};
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Link parameters and watchdog timeouts.
///
/// Missing fields take their defaults when deserialized, so a JSON file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Line speed used for the negotiation request.
    pub init_speed: u32,
    /// Line speed switched to after a successful negotiation.
    pub speed: u32,
    /// Baud divisor proposed in the negotiation request.
    pub baud_divisor: u16,
    /// Protocol mode byte ([`PROTO_BYTE`] or [`PROTO_PKT`]).
    pub mode: u8,
    /// System clock parameter proposed in the negotiation request.
    pub sysclk: u16,
    /// Deadline for each handshake response.
    pub handshake_timeout_ms: u64,
    /// Deadline for CTS after the speed switch.
    pub cts_timeout_ms: u64,
    /// CTS polling period.
    pub cts_poll_ms: u64,
    /// Transmit watchdog.
    pub tx_timeout_ms: u64,
    /// Receive watchdog.
    pub rx_timeout_ms: u64,
    /// Keep-alive period while work is pending.
    pub keepalive_ms: u64,
    /// Largest frame payload the receive buffer holds.
    pub rx_capacity: usize,
    /// Maximum number of frames waiting to be sent.
    pub tx_queue_len: usize,
    /// Largest transfer, in 32-bit words, the peer may announce.
    pub max_transfer_words: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            init_speed: 115_200,
            speed: 3_000_000,
            baud_divisor: 0x01a1,
            mode: PROTO_BYTE,
            sysclk: 38_400,
            handshake_timeout_ms: 1000,
            cts_timeout_ms: 100,
            cts_poll_ms: 1,
            tx_timeout_ms: 2000,
            rx_timeout_ms: 2000,
            keepalive_ms: 15,
            rx_capacity: DEFAULT_RX_CAPACITY,
            tx_queue_len: 100,
            max_transfer_words: 1032,
        }
    }
}

impl LinkConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| LinkError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.init_speed == 0 || self.speed == 0 {
            return Err(LinkError::InvalidConfig("line speed must be non-zero".into()));
        }
        if self.mode != PROTO_BYTE && self.mode != PROTO_PKT {
            return Err(LinkError::InvalidConfig(format!(
                "unknown protocol mode {:#04x}",
                self.mode
            )));
        }
        for (name, value) in [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("cts_timeout_ms", self.cts_timeout_ms),
            ("cts_poll_ms", self.cts_poll_ms),
            ("tx_timeout_ms", self.tx_timeout_ms),
            ("rx_timeout_ms", self.rx_timeout_ms),
            ("keepalive_ms", self.keepalive_ms),
        ] {
            if value == 0 {
                return Err(LinkError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.cts_poll_ms > self.cts_timeout_ms {
            return Err(LinkError::InvalidConfig(
                "cts_poll_ms exceeds cts_timeout_ms".into(),
            ));
        }
        if self.rx_capacity == 0 || self.tx_queue_len == 0 || self.max_transfer_words == 0 {
            return Err(LinkError::InvalidConfig(
                "rx_capacity, tx_queue_len and max_transfer_words must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn cts_timeout(&self) -> Duration {
        Duration::from_millis(self.cts_timeout_ms)
    }

    pub fn cts_poll(&self) -> Duration {
        Duration::from_millis(self.cts_poll_ms)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_millis(self.rx_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    /// Upper bound for one negotiation: negotiation response, CTS wait and
    /// alive response.
    pub fn handshake_budget(&self) -> Duration {
        self.handshake_timeout() * 2 + self.cts_timeout()
    }

    /// Largest transfer in bytes.
    pub fn max_transfer_bytes(&self) -> usize {
        usize::from(self.max_transfer_words) * 4
    }

    /// Decoder settings for the link-control byte stream.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            rx_capacity: self.rx_capacity,
        }
    }
}
