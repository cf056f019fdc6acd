// Data-driven runtime configuration.
//
// `ClientConfig` is loaded from JSON (every field optional, missing fields
// take the defaults below) and may be overridden by command-line flags in
// the `scribble` binary. Nothing in the runtime hard-codes a tunable: batch
// size, reconnect schedule, notice lifetime and canvas size all come from
// here. `player_name` and `room` are replayed after every handshake, so a
// participant that reconnects into a fresh session finds its way back.

use std::path::Path;
use std::time::Duration;

use scribble_protocol::{RoomId, RoomSettings};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Bounded reconnect schedule for the message channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts after a loss before giving up for good.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay_ms: u64,
    /// Ceiling for the doubling delay.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): doubles from
    /// `initial_delay_ms`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let grown = self.initial_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(grown.min(self.max_delay_ms))
    }
}

/// Pixel size of the drawing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
        }
    }
}

/// Room to enter automatically once named.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRequest {
    Create(RoomSettings),
    /// Room code as typed; normalized before sending.
    Join(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coordinator address, `host:port`.
    pub endpoint: String,
    /// Name to register automatically after each handshake.
    pub player_name: Option<String>,
    /// Room to create or join after naming. Needs `player_name`.
    pub room: Option<RoomRequest>,
    pub reconnect: ReconnectPolicy,
    /// Points per outbound `draw_move` batch.
    pub stroke_batch_size: usize,
    /// Lifetime of transient error notices.
    pub notice_ttl_ms: u64,
    pub canvas: CanvasSize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:3000".into(),
            player_name: None,
            room: None,
            reconnect: ReconnectPolicy::default(),
            stroke_batch_size: 5,
            notice_ttl_ms: 3000,
            canvas: CanvasSize::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }

    pub fn check(&self) -> Result<()> {
        if self.stroke_batch_size == 0 {
            return Err(ClientError::Config("stroke_batch_size must be at least 1".into()));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ClientError::Config("canvas size must be non-zero".into()));
        }
        match &self.room {
            Some(_) if self.player_name.is_none() => {
                return Err(ClientError::Config("room requires player_name".into()));
            }
            Some(RoomRequest::Create(settings)) => {
                settings.validate().map_err(ClientError::Config)?;
            }
            Some(RoomRequest::Join(code)) if RoomId::normalize(code).is_none() => {
                return Err(ClientError::Config("room code must not be empty".into()));
            }
            _ => {}
        }
        Ok(())
    }
}
