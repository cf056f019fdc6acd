// Core value types for the scribble protocol.
//
// Identifiers are coordinator-assigned opaque strings (connection-scoped
// player ids, short upper-case room codes), wrapped in newtypes so a room code
// can never be compared against a player id. The snapshot types mirror what
// the coordinator sends: `RoomSnapshot` and `PlayerSnapshot` are always
// complete, `GameFragment` may be partial (see `merge` in the client's store).
//
// Nullable game fields use `Option<Option<T>>`: the outer `None` means "field
// absent, keep the current value", `Some(None)` means "present as null, clear
// it". The `nullable` helper module keeps that distinction through serde.

use serde::{Deserialize, Serialize};

/// Coordinator-assigned player id (stable for one connection lifetime).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Short room code shared out-of-band between players.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Normalize a user-typed room code: trim whitespace and upper-case.
    /// Returns `None` when nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() { None } else { Some(Self(code)) }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Owner-editable room settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub max_players: u32,
    #[serde(alias = "drawTimeSeconds")]
    pub draw_time: u32,
    pub rounds: u32,
    #[serde(alias = "hintsEnabled")]
    pub hints: bool,
    #[serde(default)]
    pub custom_words: Vec<String>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_players: 8,
            draw_time: 80,
            rounds: 3,
            hints: true,
            custom_words: Vec::new(),
        }
    }
}

/// Allowed player caps offered by the room dialog.
pub const MAX_PLAYER_CHOICES: [u32; 4] = [2, 4, 6, 8];
/// Allowed draw time range in seconds.
pub const DRAW_TIME_RANGE: std::ops::RangeInclusive<u32> = 30..=300;
/// Allowed round count range.
pub const ROUNDS_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

impl RoomSettings {
    /// Check the settings against the ranges the coordinator accepts.
    /// Returns a human-readable reason on the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if !MAX_PLAYER_CHOICES.contains(&self.max_players) {
            return Err(format!(
                "max players must be one of {MAX_PLAYER_CHOICES:?}, got {}",
                self.max_players
            ));
        }
        if !DRAW_TIME_RANGE.contains(&self.draw_time) {
            return Err(format!(
                "draw time must be between {} and {} seconds, got {}",
                DRAW_TIME_RANGE.start(),
                DRAW_TIME_RANGE.end(),
                self.draw_time
            ));
        }
        if !ROUNDS_RANGE.contains(&self.rounds) {
            return Err(format!(
                "rounds must be between {} and {}, got {}",
                ROUNDS_RANGE.start(),
                ROUNDS_RANGE.end(),
                self.rounds
            ));
        }
        Ok(())
    }
}

/// A player as listed in a room snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_owner: bool,
}

/// Complete room state. Always sent whole; replaces the local copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub owner_id: PlayerId,
    #[serde(default)]
    pub players: Vec<PlayerSnapshot>,
    pub settings: RoomSettings,
}

impl RoomSnapshot {
    /// Look up a player's display name.
    pub fn player_name(&self, id: &PlayerId) -> Option<&str> {
        self.players
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// Sub-phase of an active round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    WordSelect,
    Drawing,
    RoundEnd,
}

/// A full or partial game snapshot. Fields absent from the JSON are `None`
/// and leave the receiver's value untouched when merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFragment {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub drawer_id: Option<Option<PlayerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub phase: Option<Option<GamePhase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub masked_word: Option<Option<String>>,
}

/// One entry of a leaderboard, in the order the coordinator sent it.
/// Player objects with extra fields deserialize into this as well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    #[serde(default)]
    pub score: i64,
}

// ---------------------------------------------------------------------------
// Strokes
// ---------------------------------------------------------------------------

/// Drawing tool carried explicitly on every stroke point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

/// Color value older participants put in `color` to mean "eraser".
pub const LEGACY_ERASER_COLOR: &str = "eraser";

/// One sampled point of a stroke, with the style it was drawn in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub color: String,
    pub line_width: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Tool>,
}

impl StrokePoint {
    /// True if this point erases, by explicit tool or by legacy color sentinel.
    pub fn is_eraser(&self) -> bool {
        self.tool == Some(Tool::Eraser) || self.color == LEGACY_ERASER_COLOR
    }

    /// The tool this point should be rendered with.
    pub fn resolved_tool(&self) -> Tool {
        if self.is_eraser() { Tool::Eraser } else { Tool::Pen }
    }
}

/// Payload of `draw_move`: older senders emit a bare point, current senders
/// an array. Both decode; order inside a batch is preserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveBatch {
    Many(Vec<StrokePoint>),
    One(StrokePoint),
}

impl MoveBatch {
    pub fn into_points(self) -> Vec<StrokePoint> {
        match self {
            MoveBatch::Many(points) => points,
            MoveBatch::One(point) => vec![point],
        }
    }
}

/// Serde adapter that keeps "absent" and "null" apart for
/// `Option<Option<T>>` fields. Pair with `#[serde(default)]` so absence
/// yields the outer `None`.
pub mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(Some(inner)) => inner.serialize(serializer),
            Some(None) | None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
