// Session State Store: the local mirror of coordinator-confirmed state.
//
// One `SessionStore` per runtime, owned by `runtime::GameClient` and passed by
// reference to whoever needs it. Reads are public. Every mutation method is
// `pub(crate)` and only `phase.rs` calls them, so no UI code can write a
// field directly.
//
// Role flags are not stored. `is_drawer()` and `can_draw()` are computed from
// the current `Game` and `Identity` on every read, so they can never lag
// behind a merge. The one piece of round-local state that feeds `can_draw()`
// is `RoundFlags::drawing_locked`: while a word is being chosen (or a round has
// just ended) nobody may draw, regardless of what the last game fragment said
// about the phase.

use scribble_protocol::{
    GameFragment, GamePhase, LeaderboardEntry, PlayerId, RoomSettings, RoomSnapshot,
};

use crate::leaderboard::{self, RankedEntry};

/// Countdown below which the timer is shown as a warning.
pub const TIMER_WARNING_SECS: u32 = 10;

/// Top-level screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Connecting,
    Naming,
    Home,
    Lobby,
    InGame,
    RoundEnd,
    GameEnd,
    /// Reconnect attempts exhausted.
    Disconnected,
}

/// Channel status as last reported by the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

/// Who this participant is, for the lifetime of one connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub session_id: String,
    pub player_id: Option<PlayerId>,
    pub player_name: Option<String>,
}

/// Local copy of the active round.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Game {
    pub drawer_id: Option<PlayerId>,
    pub phase: Option<GamePhase>,
    pub current_round: u32,
    pub total_rounds: u32,
    pub masked_word: Option<String>,
}

impl Game {
    pub fn from_fragment(fragment: GameFragment) -> Self {
        let mut game = Self::default();
        game.merge(fragment);
        game
    }

    /// Shallow merge: a field absent from the fragment keeps its value, a
    /// field present as null is cleared, anything else overwrites.
    pub fn merge(&mut self, fragment: GameFragment) {
        if let Some(drawer_id) = fragment.drawer_id {
            self.drawer_id = drawer_id;
        }
        if let Some(phase) = fragment.phase {
            self.phase = phase;
        }
        if let Some(round) = fragment.current_round {
            self.current_round = round;
        }
        if let Some(total) = fragment.total_rounds {
            self.total_rounds = total;
        }
        if let Some(masked_word) = fragment.masked_word {
            self.masked_word = masked_word;
        }
    }
}

/// Flags that live for one round (or one game, for `game_ended`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundFlags {
    pub has_guessed: bool,
    pub round_ended: bool,
    pub game_ended: bool,
    /// Drawing is locked until the next `word_selected`/`drawing_started`.
    pub drawing_locked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    pub player_name: String,
    pub message: String,
    pub is_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerState {
    pub remaining: u32,
    /// Which countdown this is (`word_select`, `drawing`).
    pub kind: String,
}

/// What the round-end screen shows.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundSummary {
    pub selected_word: Option<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug)]
pub struct SessionStore {
    screen: Screen,
    link: LinkStatus,
    identity: Option<Identity>,
    room: Option<RoomSnapshot>,
    game: Option<Game>,
    flags: RoundFlags,
    chat: Vec<ChatEntry>,
    leaderboard: Vec<LeaderboardEntry>,
    word_options: Vec<String>,
    revealed_word: Option<String>,
    timer: Option<TimerState>,
    round_summary: Option<RoundSummary>,
    final_leaderboard: Vec<LeaderboardEntry>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            screen: Screen::Connecting,
            link: LinkStatus::Connecting,
            identity: None,
            room: None,
            game: None,
            flags: RoundFlags::default(),
            chat: Vec::new(),
            leaderboard: Vec::new(),
            word_options: Vec::new(),
            revealed_word: None,
            timer: None,
            round_summary: None,
            final_leaderboard: Vec::new(),
        }
    }

    // -- reads --------------------------------------------------------------

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn link(&self) -> LinkStatus {
        self.link
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        self.identity.as_ref().and_then(|i| i.player_id.as_ref())
    }

    pub fn player_name(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.player_name.as_deref())
    }

    pub fn room(&self) -> Option<&RoomSnapshot> {
        self.room.as_ref()
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub fn flags(&self) -> RoundFlags {
        self.flags
    }

    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    /// Leaderboard in arrival order.
    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    /// Leaderboard in display order.
    pub fn ranked_leaderboard(&self) -> Vec<RankedEntry<'_>> {
        leaderboard::rank(&self.leaderboard)
    }

    pub fn word_options(&self) -> &[String] {
        &self.word_options
    }

    /// The secret word, only ever set for the drawer.
    pub fn revealed_word(&self) -> Option<&str> {
        self.revealed_word.as_deref()
    }

    pub fn timer(&self) -> Option<&TimerState> {
        self.timer.as_ref()
    }

    pub fn timer_warning(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|t| t.remaining < TIMER_WARNING_SECS)
    }

    pub fn round_summary(&self) -> Option<&RoundSummary> {
        self.round_summary.as_ref()
    }

    pub fn final_leaderboard(&self) -> &[LeaderboardEntry] {
        &self.final_leaderboard
    }

    /// Masked word as displayed, with a placeholder before the first hint.
    pub fn masked_word_display(&self) -> &str {
        self.game
            .as_ref()
            .and_then(|g| g.masked_word.as_deref())
            .unwrap_or("_ _ _")
    }

    /// Name of the current drawer, if known.
    pub fn drawer_name(&self) -> Option<&str> {
        let drawer = self.game.as_ref()?.drawer_id.as_ref()?;
        self.room.as_ref()?.player_name(drawer)
    }

    // -- derived role flags ---------------------------------------------------

    pub fn is_drawer(&self) -> bool {
        match (self.player_id(), self.game.as_ref()) {
            (Some(me), Some(game)) => game.drawer_id.as_ref() == Some(me),
            _ => false,
        }
    }

    pub fn can_draw(&self) -> bool {
        self.is_drawer()
            && !self.flags.drawing_locked
            && self
                .game
                .as_ref()
                .is_some_and(|g| g.phase == Some(GamePhase::Drawing))
    }

    pub fn is_room_owner(&self) -> bool {
        match (self.player_id(), self.room.as_ref()) {
            (Some(me), Some(room)) => &room.owner_id == me,
            _ => false,
        }
    }

    /// The lobby's start button is live for the owner once someone else joined.
    pub fn can_start_game(&self) -> bool {
        self.is_room_owner() && self.room.as_ref().is_some_and(|r| r.players.len() > 1)
    }

    // -- mutation (phase machine only) ---------------------------------------

    pub(crate) fn set_screen(&mut self, screen: Screen) {
        self.screen = screen;
    }

    pub(crate) fn set_link(&mut self, link: LinkStatus) {
        self.link = link;
    }

    /// Forget everything from an earlier connection and start a new one.
    pub(crate) fn begin_session(&mut self, session_id: String) {
        *self = Self::new();
        self.link = LinkStatus::Connected;
        self.identity = Some(Identity {
            session_id,
            player_id: None,
            player_name: None,
        });
    }

    pub(crate) fn set_player(&mut self, id: PlayerId, name: String) {
        let identity = self.identity.get_or_insert_with(|| Identity {
            session_id: String::new(),
            player_id: None,
            player_name: None,
        });
        identity.player_id = Some(id);
        identity.player_name = Some(name);
    }

    pub(crate) fn replace_room(&mut self, room: RoomSnapshot) {
        self.room = Some(room);
    }

    /// Optimistic echo of an owner's settings change.
    pub(crate) fn echo_settings(&mut self, settings: RoomSettings) {
        if let Some(room) = self.room.as_mut() {
            room.settings = settings;
        }
    }

    pub(crate) fn clear_room(&mut self) {
        self.room = None;
    }

    pub(crate) fn replace_game(&mut self, game: Game) {
        self.game = Some(game);
    }

    /// Merge a fragment into the current game. A fragment with no game to
    /// merge into starts one from defaults.
    pub(crate) fn merge_game(&mut self, fragment: GameFragment) {
        match self.game.as_mut() {
            Some(game) => game.merge(fragment),
            None => self.game = Some(Game::from_fragment(fragment)),
        }
    }

    pub(crate) fn game_mut(&mut self) -> Option<&mut Game> {
        self.game.as_mut()
    }

    pub(crate) fn clear_game(&mut self) {
        self.game = None;
    }

    pub(crate) fn flags_mut(&mut self) -> &mut RoundFlags {
        &mut self.flags
    }

    pub(crate) fn reset_flags(&mut self) {
        self.flags = RoundFlags::default();
    }

    pub(crate) fn push_chat(&mut self, entry: ChatEntry) {
        self.chat.push(entry);
    }

    pub(crate) fn clear_chat(&mut self) {
        self.chat.clear();
    }

    pub(crate) fn replace_leaderboard(&mut self, leaderboard: Vec<LeaderboardEntry>) {
        self.leaderboard = leaderboard;
    }

    pub(crate) fn set_word_options(&mut self, options: Vec<String>) {
        self.word_options = options;
    }

    pub(crate) fn set_revealed_word(&mut self, word: Option<String>) {
        self.revealed_word = word;
    }

    pub(crate) fn set_timer(&mut self, timer: Option<TimerState>) {
        self.timer = timer;
    }

    pub(crate) fn set_round_summary(&mut self, summary: Option<RoundSummary>) {
        self.round_summary = summary;
    }

    pub(crate) fn set_final_leaderboard(&mut self, leaderboard: Vec<LeaderboardEntry>) {
        self.final_leaderboard = leaderboard;
    }
}
