// scribble_protocol: wire protocol between drawing-game participants and the
// game coordinator.
//
// Shared by the participant runtime (`scribble_client`) and anything that
// speaks for the coordinator (the mock coordinator in `scribble_tests`). No
// dependency on the client runtime.
//
// Module overview:
// - `types.rs`:    Id newtypes and snapshot payloads: rooms, players, game
//                  fragments, stroke points, leaderboard entries.
// - `message.rs`:  `ClientMessage` / `ServerMessage` enums.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Field names match what the coordinator emits
//   (camelCase payloads, snake_case message kinds).
// - **Partial snapshots are explicit.** `GameFragment` distinguishes absent
//   fields from explicit nulls so merging is exact.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientMessage, PROTOCOL_VERSION, ServerMessage};
pub use types::{
    GameFragment, GamePhase, LEGACY_ERASER_COLOR, LeaderboardEntry, MoveBatch, PlayerId,
    PlayerSnapshot, RoomId, RoomSettings, RoomSnapshot, StrokePoint, Tool,
};

/// Serialize a message to JSON and write it as one frame.
pub fn send<W: std::io::Write, M: serde::Serialize>(writer: &mut W, msg: &M) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg)?;
    write_message(writer, &json)
}

/// Read one frame and deserialize it.
pub fn recv<R: std::io::Read, M: serde::de::DeserializeOwned>(reader: &mut R) -> std::io::Result<M> {
    let bytes = read_message(reader)?;
    Ok(serde_json::from_slice(&bytes)?)
}
