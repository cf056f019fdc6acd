// Error type for the participant runtime.
//
// Transport failures (`Io`, `Json`, `Rejected`) come out of the connector and
// feed the reconnect policy; they are never shown to the player directly.
// `NotConnected` / `ChannelFailed` surface through local actions when the
// channel is down. The remaining variants reject a local action before
// anything is sent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("coordinator rejected the handshake: {0}")]
    Rejected(String),

    #[error("unexpected handshake reply: {0}")]
    Handshake(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection failed after {attempts} reconnect attempts")]
    ChannelFailed { attempts: u32 },

    #[error("invalid room settings: {0}")]
    InvalidSettings(String),

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("not permitted: {0}")]
    NotPermitted(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("canvas error: {0}")]
    Canvas(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
