// scribble_client: participant runtime for the scribble drawing-and-guessing
// game.
//
// A participant holds one channel to the game coordinator, mirrors the
// coordinator's room and round state locally, drives its screens from that
// state, and replicates strokes between the drawer and everyone else. The
// coordinator is authoritative for everything; this crate never decides who
// draws, what the word is, or who scored.
//
// Module overview:
// - `connection.rs`:  `Connector`/`Channel` seams, the TCP transport (reader
//                     thread + `mpsc` inbox) and `ConnectionManager` with the
//                     bounded reconnect policy.
// - `store.rs`:       `SessionStore`, the single owned copy of session state.
//                     Role flags are derived on read, never stored.
// - `phase.rs`:       Phase State Machine. Typed dispatch from inbound
//                     messages and local actions to store transitions and
//                     `Effect`s. The only store writer.
// - `drawing.rs`:     Drawing Replication Engine: input capture, batching,
//                     remote replay, surface lifecycle.
// - `surface.rs`:     `Surface` trait, listener sets, stroke styles, and the
//                     `RecordingSurface` used by tests.
// - `raster.rs`:      tiny-skia `RasterSurface` with PNG export.
// - `leaderboard.rs`: Display ranking.
// - `runtime.rs`:     `GameClient`, the event loop tying the above together.
// - `config.rs`:      `ClientConfig`, loaded from JSON.
// - `error.rs`:       `ClientError`.
//
// Dependencies: `scribble_protocol` for messages and framing. Single-threaded
// apart from the TCP reader thread; no async runtime.

pub mod config;
pub mod connection;
pub mod drawing;
pub mod error;
pub mod leaderboard;
pub mod phase;
pub mod raster;
pub mod runtime;
pub mod store;
pub mod surface;

pub use config::ClientConfig;
pub use connection::{ChannelEvent, ChannelState, ConnectionManager, Connector, TcpConnector};
pub use drawing::{DrawingEngine, InputEvent, Point, StrokeCommand};
pub use error::{ClientError, Result};
pub use phase::{Effect, View};
pub use raster::RasterSurface;
pub use runtime::GameClient;
pub use store::{Screen, SessionStore};
pub use surface::{RecordingSurface, Surface};
