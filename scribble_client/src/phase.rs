// Phase State Machine: the only writer of the `SessionStore`.
//
// Inbound messages enter through `apply()`, which dispatches on the message
// kind to one handler per kind. Every handler that receives a game fragment
// merges it first and only then asks the store for role flags; the store
// derives `is_drawer`/`can_draw` from the merged snapshot, so a stale flag can
// never survive a drawer change between `word_options` and `word_selected`.
//
// Handlers return `Effect`s instead of touching the UI or the drawing surface.
// `Screen`/`Render`/`Notice`/`WordOptions` go to the render layer;
// `ClearSurface` runs immediately and `ReinitSurface` is deferred until the
// current message has been fully handled (see `runtime.rs`).
//
// Channel lifecycle (`on_connected` and friends) and local player actions
// (`submit_player_name`, `create_room`, ...) also live here, so the store has
// exactly one writer. Stroke traffic (`draw_*`, `clear_canvas`) bypasses this
// module and goes straight to the drawing engine.

use scribble_protocol::{
    ClientMessage, GameFragment, LeaderboardEntry, PlayerId, RoomId, RoomSettings, RoomSnapshot,
    ServerMessage,
};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::store::{
    ChatEntry, Game, LinkStatus, RoundSummary, Screen, SessionStore, TimerState,
};

/// Which part of the UI needs re-projecting from the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Lobby,
    Settings,
    GameHeader,
    GamePhase,
    MaskedWord,
    Chat,
    Leaderboard,
    Timer,
    RoundSummary,
    FinalResults,
    Connection,
}

/// Consequences of one state transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Screen(Screen),
    Render(View),
    /// Transient, auto-expiring message for the player.
    Notice(String),
    /// Words offered to the drawer.
    WordOptions(Vec<String>),
    /// Tear down and rebuild the drawing surface (deferred).
    ReinitSurface,
    /// Wipe the drawing surface now.
    ClearSurface,
}

/// Result of a local action: what to send, and what changed locally.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub outbound: Vec<ClientMessage>,
    pub effects: Vec<Effect>,
}

impl Outcome {
    fn send(msg: ClientMessage) -> Self {
        Self {
            outbound: vec![msg],
            effects: Vec::new(),
        }
    }
}

/// Apply one inbound coordinator message to the store.
pub fn apply(store: &mut SessionStore, msg: ServerMessage) -> Vec<Effect> {
    let mut fx = Vec::new();
    let could_draw = store.can_draw();
    debug!(kind = msg.kind(), "applying");

    match msg {
        ServerMessage::Welcome { .. } | ServerMessage::Rejected { .. } => {
            debug!("handshake message outside the handshake; ignoring");
        }
        ServerMessage::IdentityUpdate { id, name } => on_identity_update(store, id, name),
        ServerMessage::RoomCreated { room } | ServerMessage::RoomJoined { room } => {
            on_room_entered(store, room, &mut fx)
        }
        ServerMessage::RoomUpdated { room } => on_room_updated(store, room, &mut fx),
        ServerMessage::RoomSettingsUpdated { room } => {
            on_room_settings_updated(store, room, &mut fx)
        }
        ServerMessage::RoomLeft => on_room_left(store, &mut fx),
        ServerMessage::RoomError { error, message } => {
            fx.push(Effect::Notice(error_text(error, message, "Room error occurred")))
        }
        ServerMessage::GameError { error, message } => {
            fx.push(Effect::Notice(error_text(error, message, "Game error occurred")))
        }
        ServerMessage::GameStarted {
            game,
            room,
            players,
        } => on_game_started(store, game, room, players, &mut fx),
        ServerMessage::WordOptions { options, game } => {
            on_word_options(store, options, game, &mut fx)
        }
        ServerMessage::WordSelected { masked_word, game } => {
            on_word_selected(store, masked_word, game, &mut fx)
        }
        ServerMessage::DrawingStarted { word, game } => {
            on_drawing_started(store, word, game, &mut fx)
        }
        ServerMessage::DrawStart(_)
        | ServerMessage::DrawMove(_)
        | ServerMessage::DrawEnd
        | ServerMessage::ClearCanvas => {
            debug!("stroke message belongs to the drawing engine; ignoring");
        }
        ServerMessage::TimerTick { remaining, kind } => {
            store.set_timer(Some(TimerState { remaining, kind }));
            fx.push(Effect::Render(View::Timer));
        }
        ServerMessage::HintUpdate { hint_word } => on_hint_update(store, hint_word, &mut fx),
        ServerMessage::ChatMessage {
            player_name,
            message,
            is_correct,
        } => {
            store.push_chat(ChatEntry {
                player_name,
                message,
                is_correct,
            });
            fx.push(Effect::Render(View::Chat));
        }
        ServerMessage::CorrectGuess {
            player_name,
            score,
            leaderboard,
        } => on_correct_guess(store, player_name, score, leaderboard, &mut fx),
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            store.replace_leaderboard(leaderboard);
            fx.push(Effect::Render(View::Leaderboard));
        }
        ServerMessage::RoundEnded {
            game,
            round_completed,
            selected_word,
            leaderboard,
        } => on_round_ended(
            store,
            game,
            round_completed,
            selected_word,
            leaderboard,
            &mut fx,
        ),
        ServerMessage::GameEnded { leaderboard } => on_game_ended(store, leaderboard, &mut fx),
        ServerMessage::GameReset { room } => on_game_reset(store, room, &mut fx),
    }

    revoke_if_lost(store, could_draw, &mut fx);
    fx
}

// ---------------------------------------------------------------------------
// Inbound handlers
// ---------------------------------------------------------------------------

fn on_identity_update(store: &mut SessionStore, id: PlayerId, name: String) {
    info!(player_id = %id.0, %name, "identity confirmed");
    store.set_player(id, name);
}

fn on_room_entered(store: &mut SessionStore, room: RoomSnapshot, fx: &mut Vec<Effect>) {
    info!(room = %room.id.0, "entered room");
    store.replace_room(room);
    store.clear_game();
    enter(store, Screen::Lobby, fx);
    fx.push(Effect::Render(View::Lobby));
}

fn on_room_updated(store: &mut SessionStore, room: RoomSnapshot, fx: &mut Vec<Effect>) {
    store.replace_room(room);
    fx.push(Effect::Render(View::Lobby));
}

fn on_room_settings_updated(store: &mut SessionStore, room: RoomSnapshot, fx: &mut Vec<Effect>) {
    store.replace_room(room);
    fx.push(Effect::Render(View::Settings));
}

fn on_room_left(store: &mut SessionStore, fx: &mut Vec<Effect>) {
    clear_room_state(store);
    enter(store, Screen::Home, fx);
}

fn on_game_started(
    store: &mut SessionStore,
    game: GameFragment,
    room: RoomSnapshot,
    players: Vec<LeaderboardEntry>,
    fx: &mut Vec<Effect>,
) {
    store.replace_game(Game::from_fragment(game));
    store.replace_room(room);
    store.clear_chat();
    store.replace_leaderboard(players);
    store.reset_flags();
    store.set_revealed_word(None);
    store.set_word_options(Vec::new());
    store.set_round_summary(None);
    store.set_timer(None);
    info!(drawer = store.is_drawer(), "game started");
    enter(store, Screen::InGame, fx);
    fx.push(Effect::Render(View::GameHeader));
    fx.push(Effect::Render(View::Leaderboard));
    fx.push(Effect::Render(View::GamePhase));
}

fn on_word_options(
    store: &mut SessionStore,
    options: Vec<String>,
    game: Option<GameFragment>,
    fx: &mut Vec<Effect>,
) {
    if let Some(fragment) = game {
        store.merge_game(fragment);
    }
    // Nobody draws while a word is being chosen, the next drawer included.
    store.flags_mut().drawing_locked = true;
    store.set_word_options(options.clone());
    fx.push(Effect::WordOptions(options));
    fx.push(Effect::Render(View::GamePhase));
}

fn on_word_selected(
    store: &mut SessionStore,
    masked_word: String,
    game: Option<GameFragment>,
    fx: &mut Vec<Effect>,
) {
    if let Some(fragment) = game {
        store.merge_game(fragment);
    }
    store.merge_game(GameFragment {
        phase: Some(Some(scribble_protocol::GamePhase::Drawing)),
        masked_word: Some(Some(masked_word)),
        ..GameFragment::default()
    });
    store.flags_mut().drawing_locked = false;
    store.set_word_options(Vec::new());
    fx.push(Effect::Render(View::GamePhase));
    fx.push(Effect::Render(View::MaskedWord));
    fx.push(Effect::ReinitSurface);
}

fn on_drawing_started(
    store: &mut SessionStore,
    word: Option<String>,
    game: Option<GameFragment>,
    fx: &mut Vec<Effect>,
) {
    if let Some(fragment) = game {
        store.merge_game(fragment);
    }
    store.flags_mut().drawing_locked = false;
    if store.is_drawer() {
        store.set_revealed_word(word);
    }
    fx.push(Effect::Render(View::GameHeader));
    fx.push(Effect::ClearSurface);
    fx.push(Effect::ReinitSurface);
}

fn on_hint_update(store: &mut SessionStore, hint_word: Option<String>, fx: &mut Vec<Effect>) {
    let Some(hint) = hint_word else {
        return;
    };
    if store.is_drawer() {
        return;
    }
    if let Some(game) = store.game_mut() {
        game.masked_word = Some(hint);
        fx.push(Effect::Render(View::MaskedWord));
    }
}

fn on_correct_guess(
    store: &mut SessionStore,
    player_name: String,
    score: i64,
    leaderboard: Option<Vec<LeaderboardEntry>>,
    fx: &mut Vec<Effect>,
) {
    if store.player_name() == Some(player_name.as_str()) {
        store.flags_mut().has_guessed = true;
    }
    store.push_chat(ChatEntry {
        player_name,
        message: format!("guessed the word! (+{score})"),
        is_correct: true,
    });
    fx.push(Effect::Render(View::Chat));
    if let Some(board) = leaderboard {
        store.replace_leaderboard(board);
        fx.push(Effect::Render(View::Leaderboard));
    }
}

fn on_round_ended(
    store: &mut SessionStore,
    game: Option<GameFragment>,
    round_completed: bool,
    selected_word: Option<String>,
    leaderboard: Option<Vec<LeaderboardEntry>>,
    fx: &mut Vec<Effect>,
) {
    // Carries the next round's drawer.
    if let Some(fragment) = game {
        store.merge_game(fragment);
    }
    if let Some(game) = store.game_mut() {
        game.masked_word = None;
    }
    {
        let flags = store.flags_mut();
        flags.drawing_locked = true;
        flags.has_guessed = false;
        flags.round_ended = round_completed;
    }
    store.set_revealed_word(None);
    store.set_word_options(Vec::new());
    if let Some(board) = leaderboard.clone() {
        store.replace_leaderboard(board);
    }

    if round_completed {
        store.set_round_summary(Some(RoundSummary {
            selected_word,
            leaderboard: leaderboard.unwrap_or_default(),
        }));
        enter(store, Screen::RoundEnd, fx);
        fx.push(Effect::Render(View::RoundSummary));
    } else {
        enter(store, Screen::InGame, fx);
    }
}

fn on_game_ended(store: &mut SessionStore, leaderboard: Vec<LeaderboardEntry>, fx: &mut Vec<Effect>) {
    {
        let flags = store.flags_mut();
        flags.game_ended = true;
        flags.drawing_locked = true;
    }
    store.replace_leaderboard(leaderboard.clone());
    store.set_final_leaderboard(leaderboard);
    enter(store, Screen::GameEnd, fx);
    fx.push(Effect::Render(View::FinalResults));
}

fn on_game_reset(store: &mut SessionStore, room: RoomSnapshot, fx: &mut Vec<Effect>) {
    let players = room
        .players
        .iter()
        .map(|p| LeaderboardEntry {
            name: p.name.clone(),
            score: p.score,
        })
        .collect();
    store.replace_room(room);
    clear_game_state(store);
    store.replace_leaderboard(players);
    enter(store, Screen::Lobby, fx);
    fx.push(Effect::Render(View::Lobby));
}

// ---------------------------------------------------------------------------
// Channel lifecycle
// ---------------------------------------------------------------------------

/// Handshake complete. Anything held from an earlier connection is stale, so
/// the session starts over from the naming screen.
pub fn on_connected(store: &mut SessionStore, session_id: String) -> Vec<Effect> {
    let mut fx = Vec::new();
    let could_draw = store.can_draw();
    store.begin_session(session_id);
    enter(store, Screen::Naming, &mut fx);
    fx.push(Effect::Render(View::Connection));
    revoke_if_lost(store, could_draw, &mut fx);
    fx
}

pub fn on_disconnected(store: &mut SessionStore) -> Vec<Effect> {
    store.set_link(LinkStatus::Connecting);
    vec![
        Effect::Notice("Connection lost, reconnecting".into()),
        Effect::Render(View::Connection),
    ]
}

pub fn on_reconnecting(store: &mut SessionStore, attempt: u32) -> Vec<Effect> {
    store.set_link(LinkStatus::Reconnecting { attempt });
    vec![Effect::Render(View::Connection)]
}

/// Reconnect budget exhausted: park on a persistent disconnected screen.
pub fn on_failed(store: &mut SessionStore) -> Vec<Effect> {
    let mut fx = Vec::new();
    let could_draw = store.can_draw();
    store.set_link(LinkStatus::Failed);
    store.flags_mut().drawing_locked = true;
    enter(store, Screen::Disconnected, &mut fx);
    fx.push(Effect::Render(View::Connection));
    revoke_if_lost(store, could_draw, &mut fx);
    fx
}

// ---------------------------------------------------------------------------
// Local actions
// ---------------------------------------------------------------------------

pub fn submit_player_name(store: &mut SessionStore, raw: &str) -> Result<Outcome> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ClientError::InvalidInput("please enter a name"));
    }
    let mut outcome = Outcome::send(ClientMessage::SetPlayerName { name: name.into() });
    enter(store, Screen::Home, &mut outcome.effects);
    Ok(outcome)
}

pub fn create_room(settings: RoomSettings) -> Result<Outcome> {
    settings.validate().map_err(ClientError::InvalidSettings)?;
    Ok(Outcome::send(ClientMessage::CreateRoom { settings }))
}

pub fn join_room(raw_code: &str) -> Result<Outcome> {
    let room_id =
        RoomId::normalize(raw_code).ok_or(ClientError::InvalidInput("please enter a room code"))?;
    Ok(Outcome::send(ClientMessage::JoinRoom { room_id }))
}

/// Ask to leave. The store changes when `room_left` confirms.
pub fn leave_room(store: &SessionStore) -> Result<Outcome> {
    if store.room().is_none() {
        return Err(ClientError::NotPermitted("not in a room"));
    }
    Ok(Outcome::send(ClientMessage::LeaveRoom))
}

pub fn start_game(store: &SessionStore) -> Result<Outcome> {
    if !store.is_room_owner() {
        return Err(ClientError::NotPermitted("only the room owner can start the game"));
    }
    if !store.can_start_game() {
        return Err(ClientError::NotPermitted("waiting for more players"));
    }
    Ok(Outcome::send(ClientMessage::StartGame))
}

pub fn select_word(store: &SessionStore, word: &str) -> Result<Outcome> {
    if !store.is_drawer() {
        return Err(ClientError::NotPermitted("only the drawer picks the word"));
    }
    if !store.word_options().iter().any(|w| w == word) {
        return Err(ClientError::InvalidInput("not one of the offered words"));
    }
    Ok(Outcome::send(ClientMessage::SelectWord { word: word.into() }))
}

/// Guesses from the drawer and blank guesses are dropped without error.
pub fn submit_guess(store: &SessionStore, raw: &str) -> Result<Outcome> {
    let guess = raw.trim();
    if store.is_drawer() || guess.is_empty() {
        return Ok(Outcome::default());
    }
    Ok(Outcome::send(ClientMessage::Guess {
        guess: guess.into(),
    }))
}

pub fn play_again(store: &SessionStore) -> Result<Outcome> {
    if !store.is_room_owner() {
        return Err(ClientError::NotPermitted("only the room owner can restart"));
    }
    Ok(Outcome::send(ClientMessage::PlayAgain))
}

/// Owner edits settings: echo locally now, the next `room_settings_updated`
/// overwrites the echo either way.
pub fn update_room_settings(store: &mut SessionStore, settings: RoomSettings) -> Result<Outcome> {
    if !store.is_room_owner() {
        return Err(ClientError::NotPermitted("only the room owner can change settings"));
    }
    settings.validate().map_err(ClientError::InvalidSettings)?;
    store.echo_settings(settings.clone());
    let mut outcome = Outcome::send(ClientMessage::UpdateRoomSettings { settings });
    outcome.effects.push(Effect::Render(View::Settings));
    Ok(outcome)
}

/// Abandon whatever is going on and return to the home screen.
pub fn go_home(store: &mut SessionStore) -> Outcome {
    let mut outcome = Outcome::default();
    let could_draw = store.can_draw();
    if store.room().is_some() {
        outcome.outbound.push(ClientMessage::LeaveRoom);
    }
    clear_room_state(store);
    enter(store, Screen::Home, &mut outcome.effects);
    revoke_if_lost(store, could_draw, &mut outcome.effects);
    outcome
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Notice text for an error payload: `error`, else `message`, else `fallback`.
fn error_text(error: Option<String>, message: Option<String>, fallback: &str) -> String {
    error.or(message).unwrap_or_else(|| fallback.into())
}

/// Switch macro-state. Entering the game while allowed to draw rebuilds the
/// surface so listeners match the permission.
fn enter(store: &mut SessionStore, screen: Screen, fx: &mut Vec<Effect>) {
    store.set_screen(screen);
    fx.push(Effect::Screen(screen));
    if screen == Screen::InGame && store.can_draw() {
        fx.push(Effect::ReinitSurface);
    }
}

/// A handler that took drawing permission away must also take the
/// listeners away.
fn revoke_if_lost(store: &SessionStore, could_draw: bool, fx: &mut Vec<Effect>) {
    if could_draw && !store.can_draw() && !fx.contains(&Effect::ReinitSurface) {
        fx.push(Effect::ReinitSurface);
    }
}

fn clear_game_state(store: &mut SessionStore) {
    store.clear_game();
    store.clear_chat();
    store.replace_leaderboard(Vec::new());
    store.reset_flags();
    store.set_revealed_word(None);
    store.set_word_options(Vec::new());
    store.set_timer(None);
    store.set_round_summary(None);
    store.set_final_leaderboard(Vec::new());
}

fn clear_room_state(store: &mut SessionStore) {
    store.clear_room();
    clear_game_state(store);
}
