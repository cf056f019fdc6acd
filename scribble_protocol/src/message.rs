// Protocol messages between a participant and the game coordinator.
//
// Two enums define the full vocabulary:
// - `ClientMessage`: commands a participant sends.
// - `ServerMessage`: snapshots and events the coordinator sends.
//
// Both are adjacently tagged: `{"type": "room_joined", "data": {...}}`, with
// snake_case kinds and camelCase payload fields. Zero-payload kinds carry no
// `data` key. Snapshot payload types live in `types.rs`.
//
// The coordinator is authoritative for everything here; the participant only
// mirrors it (see the client crate's store and phase machine).

use serde::{Deserialize, Serialize};

use crate::types::{
    GameFragment, LeaderboardEntry, MoveBatch, PlayerId, RoomId, RoomSettings, RoomSnapshot,
    StrokePoint,
};

/// Protocol version sent in `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent by a participant to the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Open a session (handshake).
    Hello { protocol_version: u32 },
    SetPlayerName { name: String },
    CreateRoom { settings: RoomSettings },
    JoinRoom { room_id: RoomId },
    LeaveRoom,
    /// Owner starts the game from the lobby.
    StartGame,
    /// Drawer picks one of the offered words.
    SelectWord { word: String },
    /// First point of a stroke, with its style.
    DrawStart(StrokePoint),
    /// Up to one batch of subsequent points.
    DrawMove(Vec<StrokePoint>),
    DrawEnd,
    ClearCanvas,
    Guess { guess: String },
    /// Owner restarts after the game ended.
    PlayAgain,
    UpdateRoomSettings { settings: RoomSettings },
    /// Participant is leaving deliberately.
    Goodbye,
}

/// Messages sent by the coordinator to a participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Handshake accepted; the channel is ready.
    Welcome { session_id: String },
    /// Handshake refused.
    Rejected { reason: String },
    IdentityUpdate { id: PlayerId, name: String },
    RoomCreated { room: RoomSnapshot },
    RoomJoined { room: RoomSnapshot },
    RoomUpdated { room: RoomSnapshot },
    RoomSettingsUpdated { room: RoomSnapshot },
    RoomLeft,
    /// Either field may carry the text.
    RoomError {
        error: Option<String>,
        message: Option<String>,
    },
    GameError {
        error: Option<String>,
        message: Option<String>,
    },
    GameStarted {
        game: GameFragment,
        room: RoomSnapshot,
        #[serde(default)]
        players: Vec<LeaderboardEntry>,
    },
    WordOptions {
        #[serde(default)]
        options: Vec<String>,
        game: Option<GameFragment>,
    },
    WordSelected {
        masked_word: String,
        game: Option<GameFragment>,
    },
    /// `word` is only present for the drawer.
    DrawingStarted {
        word: Option<String>,
        game: Option<GameFragment>,
    },
    DrawStart(StrokePoint),
    DrawMove(MoveBatch),
    DrawEnd,
    ClearCanvas,
    /// `kind` is the countdown being shown (`word_select` or `drawing`).
    TimerTick {
        remaining: u32,
        #[serde(rename = "type")]
        kind: String,
    },
    HintUpdate { hint_word: Option<String> },
    ChatMessage {
        player_name: String,
        message: String,
        #[serde(default)]
        is_correct: bool,
    },
    CorrectGuess {
        player_name: String,
        score: i64,
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    LeaderboardUpdate {
        #[serde(default)]
        leaderboard: Vec<LeaderboardEntry>,
    },
    RoundEnded {
        game: Option<GameFragment>,
        #[serde(default)]
        round_completed: bool,
        selected_word: Option<String>,
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    GameEnded {
        #[serde(default)]
        leaderboard: Vec<LeaderboardEntry>,
    },
    GameReset { room: RoomSnapshot },
}

impl ServerMessage {
    /// The wire name of this message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Rejected { .. } => "rejected",
            ServerMessage::IdentityUpdate { .. } => "identity_update",
            ServerMessage::RoomCreated { .. } => "room_created",
            ServerMessage::RoomJoined { .. } => "room_joined",
            ServerMessage::RoomUpdated { .. } => "room_updated",
            ServerMessage::RoomSettingsUpdated { .. } => "room_settings_updated",
            ServerMessage::RoomLeft => "room_left",
            ServerMessage::RoomError { .. } => "room_error",
            ServerMessage::GameError { .. } => "game_error",
            ServerMessage::GameStarted { .. } => "game_started",
            ServerMessage::WordOptions { .. } => "word_options",
            ServerMessage::WordSelected { .. } => "word_selected",
            ServerMessage::DrawingStarted { .. } => "drawing_started",
            ServerMessage::DrawStart(_) => "draw_start",
            ServerMessage::DrawMove(_) => "draw_move",
            ServerMessage::DrawEnd => "draw_end",
            ServerMessage::ClearCanvas => "clear_canvas",
            ServerMessage::TimerTick { .. } => "timer_tick",
            ServerMessage::HintUpdate { .. } => "hint_update",
            ServerMessage::ChatMessage { .. } => "chat_message",
            ServerMessage::CorrectGuess { .. } => "correct_guess",
            ServerMessage::LeaderboardUpdate { .. } => "leaderboard_update",
            ServerMessage::RoundEnded { .. } => "round_ended",
            ServerMessage::GameEnded { .. } => "game_ended",
            ServerMessage::GameReset { .. } => "game_reset",
        }
    }
}
