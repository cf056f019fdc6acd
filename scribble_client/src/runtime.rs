// Participant runtime: one cooperative event loop over the four parts.
//
// `GameClient` owns the `ConnectionManager`, the `SessionStore`, the
// `DrawingEngine` and the notice board. The caller drives it:
//
//     client.start(now);
//     loop {
//         for effect in client.pump(Instant::now()) { render(effect) }
//         // feed local input: client.pointer(..), client.submit_guess(..), ...
//         sleep until client.next_wakeup() or new input
//     }
//
// Every channel event and every local action is one task that runs to
// completion. Routing inside a task: stroke messages go straight to the
// drawing engine, everything else through `phase::apply`, which is the only
// store writer. `ClearSurface` effects run immediately; `ReinitSurface`
// effects only set a flag, and the surface is rebuilt once after the task
// finishes, so several requests in one task collapse into one rebuild.
//
// Effects handed back to the caller are the render-layer ones (`Screen`,
// `Render`, `Notice`, `WordOptions`). Surface effects are consumed here.

use std::time::Instant;

use scribble_protocol::{ClientMessage, RoomSettings, Tool};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, RoomRequest};
use crate::connection::{ChannelEvent, ChannelState, ConnectionManager, Connector};
use crate::drawing::{DrawingEngine, InputEvent, StrokeCommand};
use crate::error::{ClientError, Result};
use crate::phase::{self, Effect, Outcome};
use crate::store::SessionStore;
use crate::surface::Surface;

/// A transient message for the player.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub text: String,
    pub expires_at: Instant,
}

pub struct GameClient<C: Connector, S: Surface> {
    connection: ConnectionManager<C>,
    store: SessionStore,
    engine: DrawingEngine<S>,
    config: ClientConfig,
    notices: Vec<Notice>,
    reinit_requested: bool,
}

impl<C: Connector, S: Surface> GameClient<C, S> {
    pub fn new(connector: C, surface: S, config: ClientConfig) -> Self {
        let connection =
            ConnectionManager::new(connector, config.endpoint.clone(), config.reconnect.clone());
        let engine = DrawingEngine::new(surface, config.stroke_batch_size);
        Self {
            connection,
            store: SessionStore::new(),
            engine,
            config,
            notices: Vec::new(),
            reinit_requested: false,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn engine(&self) -> &DrawingEngine<S> {
        &self.engine
    }

    pub fn channel_state(&self) -> &ChannelState {
        self.connection.state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the channel and run whatever that produced.
    pub fn start(&mut self, now: Instant) -> Vec<Effect> {
        self.engine.reinitialize(false);
        self.connection.connect(now);
        self.pump(now)
    }

    /// Run every pending channel event as its own task.
    pub fn pump(&mut self, now: Instant) -> Vec<Effect> {
        self.notices.retain(|n| n.expires_at > now);
        let mut rendered = Vec::new();
        for event in self.connection.poll(now) {
            let fx = self.on_channel_event(event);
            self.finish_task(fx, now, &mut rendered);
        }
        rendered
    }

    /// Notices still live at `now`, oldest first.
    pub fn notices(&self, now: Instant) -> impl Iterator<Item = &str> {
        self.notices
            .iter()
            .filter(move |n| n.expires_at > now)
            .map(|n| n.text.as_str())
    }

    /// Next instant at which `pump` has timed work: a reconnect attempt or a
    /// notice expiring.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let notice = self.notices.iter().map(|n| n.expires_at).min();
        match (self.connection.next_wakeup(), notice) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Deliberate shutdown.
    pub fn close(&mut self) {
        self.connection.close();
    }

    // -- local actions --------------------------------------------------------

    pub fn submit_player_name(&mut self, name: &str, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::submit_player_name(store, name))
    }

    pub fn create_room(&mut self, settings: RoomSettings, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |_| phase::create_room(settings))
    }

    pub fn join_room(&mut self, code: &str, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |_| phase::join_room(code))
    }

    pub fn leave_room(&mut self, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::leave_room(store))
    }

    pub fn start_game(&mut self, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::start_game(store))
    }

    pub fn select_word(&mut self, word: &str, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::select_word(store, word))
    }

    pub fn submit_guess(&mut self, guess: &str, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::submit_guess(store, guess))
    }

    pub fn play_again(&mut self, now: Instant) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::play_again(store))
    }

    pub fn update_room_settings(
        &mut self,
        settings: RoomSettings,
        now: Instant,
    ) -> Result<Vec<Effect>> {
        self.act(now, |store| phase::update_room_settings(store, settings))
    }

    /// Works with or without a channel; `leave_room` is only sent if one is
    /// open.
    pub fn go_home(&mut self, now: Instant) -> Vec<Effect> {
        let Outcome { outbound, effects } = phase::go_home(&mut self.store);
        if self.connection.is_connected() {
            self.send_all(outbound);
        }
        let mut rendered = Vec::new();
        self.finish_task(effects, now, &mut rendered);
        rendered
    }

    // -- drawing --------------------------------------------------------------

    pub fn pointer(&mut self, event: InputEvent) -> Result<()> {
        let out = self.engine.handle_input(event, self.store.can_draw());
        self.send_each(&out)
    }

    pub fn clear_canvas(&mut self) -> Result<()> {
        let out = self.engine.clear_canvas(self.store.can_draw())?;
        self.send_each(&out)
    }

    pub fn select_tool(&mut self, tool: Tool) {
        self.engine.select_tool(tool);
    }

    pub fn select_color(&mut self, color: &str) -> Result<()> {
        self.engine.select_color(color)
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<()> {
        self.engine.set_line_width(width)
    }

    // -- internals ------------------------------------------------------------

    fn on_channel_event(&mut self, event: ChannelEvent) -> Vec<Effect> {
        match event {
            ChannelEvent::Connected { session_id } => {
                let mut fx = phase::on_connected(&mut self.store, session_id);
                fx.extend(self.auto_enter());
                fx
            }
            ChannelEvent::Message(msg) => match StrokeCommand::from_message(msg) {
                Ok(stroke) => {
                    self.engine.replay(stroke, self.store.is_drawer());
                    Vec::new()
                }
                Err(msg) => phase::apply(&mut self.store, msg),
            },
            ChannelEvent::Disconnected => phase::on_disconnected(&mut self.store),
            ChannelEvent::Reconnecting { attempt, delay } => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
                phase::on_reconnecting(&mut self.store, attempt)
            }
            ChannelEvent::Failed { attempts } => {
                warn!(attempts, "coordinator unreachable");
                phase::on_failed(&mut self.store)
            }
        }
    }

    /// Register the configured name right after the handshake, then ask for
    /// the configured room.
    fn auto_enter(&mut self) -> Vec<Effect> {
        let Some(name) = self.config.player_name.clone() else {
            return Vec::new();
        };
        let mut effects = match phase::submit_player_name(&mut self.store, &name) {
            Ok(outcome) => self.deliver(outcome),
            Err(e) => {
                warn!("configured player name rejected: {e}");
                return Vec::new();
            }
        };
        let entered = match self.config.room.clone() {
            Some(RoomRequest::Create(settings)) => phase::create_room(settings),
            Some(RoomRequest::Join(code)) => phase::join_room(&code),
            None => return effects,
        };
        match entered {
            Ok(outcome) => effects.extend(self.deliver(outcome)),
            Err(e) => warn!("configured room request rejected: {e}"),
        }
        effects
    }

    /// Send an outcome's messages best-effort and hand back its effects.
    fn deliver(&mut self, outcome: Outcome) -> Vec<Effect> {
        let Outcome { outbound, effects } = outcome;
        self.send_all(outbound);
        effects
    }

    fn act(
        &mut self,
        now: Instant,
        action: impl FnOnce(&mut SessionStore) -> Result<Outcome>,
    ) -> Result<Vec<Effect>> {
        self.ensure_connected()?;
        let Outcome { outbound, effects } = action(&mut self.store)?;
        let sent = self.send_each(&outbound);
        let mut rendered = Vec::new();
        self.finish_task(effects, now, &mut rendered);
        sent.map(|()| rendered)
    }

    /// Send every message in order even if one fails, and report the first
    /// failure.
    fn send_each(&mut self, msgs: &[ClientMessage]) -> Result<()> {
        let mut first_err = None;
        for msg in msgs {
            if let Err(e) = self.connection.send(msg) {
                debug!(?msg, "send failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.connection.state() {
            ChannelState::Connected { .. } => Ok(()),
            ChannelState::Failed => Err(ClientError::ChannelFailed {
                attempts: self.config.reconnect.max_attempts,
            }),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Apply one task's effects, then run the deferred surface rebuild.
    fn finish_task(&mut self, effects: Vec<Effect>, now: Instant, rendered: &mut Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ClearSurface => self.engine.wipe(),
                Effect::ReinitSurface => self.reinit_requested = true,
                Effect::Notice(text) => {
                    self.notices.push(Notice {
                        text: text.clone(),
                        expires_at: now + self.config.notice_ttl(),
                    });
                    rendered.push(Effect::Notice(text));
                }
                other => rendered.push(other),
            }
        }

        if std::mem::take(&mut self.reinit_requested) {
            let tail = self.engine.reinitialize(self.store.can_draw());
            self.send_all(tail);
        }
    }

    /// Best-effort send for messages produced outside a local action.
    fn send_all(&mut self, msgs: Vec<ClientMessage>) {
        for msg in msgs {
            if let Err(e) = self.connection.send(&msg) {
                debug!(?msg, "dropped outbound message: {e}");
            }
        }
    }
}
