// Drawing Replication Engine.
//
// Owns the drawing surface and its listeners. Two directions:
//
// - **Capture.** While drawing is permitted, pointer input becomes strokes:
//   down sends `draw_start` with the first point, moves are rendered locally
//   at once and buffered into `draw_move` batches of `batch_size` points, and
//   up/leave flushes any partial batch before sending `draw_end`. The start
//   point is not part of any batch.
// - **Replay.** Inbound strokes from the drawer are applied to the surface
//   (only when the local player is not the drawer, since the drawer already
//   rendered them from input). Style is resolved per point, so either eraser
//   signal works.
//
// `reinitialize` is the surface lifecycle: it ends any local stroke cleanly,
// then rebuilds the surface with a fresh `ListenerSet` generation if drawing
// is allowed, or with none. Calling it twice in a row leaves exactly one set
// attached.
//
// The engine never decides permission itself; the caller passes the store's
// `can_draw()` / `is_drawer()` on every call.

use scribble_protocol::{ClientMessage, ServerMessage, StrokePoint, Tool};
use tracing::{debug, trace};

use crate::error::{ClientError, Result};
use crate::surface::{InputKind, ListenerSet, Rgba, StrokeStyle, Surface};

/// Colors offered to the drawer, first is the default.
pub const PALETTE: [&str; 8] = [
    "#000000", "#FFFFFF", "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF8800", "#FF00FF",
];

pub const DEFAULT_LINE_WIDTH: f32 = 4.0;

/// Surface-local pointer position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Raw pointer input, one variant per bindable listener.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    MouseDown(Point),
    MouseMove(Point),
    MouseUp,
    MouseOut,
    TouchStart(Point),
    TouchMove(Point),
    TouchEnd,
}

impl InputEvent {
    pub fn kind(&self) -> InputKind {
        match self {
            InputEvent::MouseDown(_) => InputKind::MouseDown,
            InputEvent::MouseMove(_) => InputKind::MouseMove,
            InputEvent::MouseUp => InputKind::MouseUp,
            InputEvent::MouseOut => InputKind::MouseOut,
            InputEvent::TouchStart(_) => InputKind::TouchStart,
            InputEvent::TouchMove(_) => InputKind::TouchMove,
            InputEvent::TouchEnd => InputKind::TouchEnd,
        }
    }
}

/// An inbound stroke message, split off the general message stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StrokeCommand {
    Start(StrokePoint),
    Move(Vec<StrokePoint>),
    End,
    Clear,
}

impl StrokeCommand {
    /// Take a stroke message, or hand the message back untouched.
    pub fn from_message(msg: ServerMessage) -> std::result::Result<Self, ServerMessage> {
        match msg {
            ServerMessage::DrawStart(point) => Ok(StrokeCommand::Start(point)),
            ServerMessage::DrawMove(batch) => Ok(StrokeCommand::Move(batch.into_points())),
            ServerMessage::DrawEnd => Ok(StrokeCommand::End),
            ServerMessage::ClearCanvas => Ok(StrokeCommand::Clear),
            other => Err(other),
        }
    }
}

/// Current tool, color and width.
#[derive(Clone, Debug, PartialEq)]
pub struct Brush {
    pub tool: Tool,
    /// Last pen color. Kept while erasing so switching back restores it.
    pub color: String,
    pub line_width: f32,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: PALETTE[0].to_string(),
            line_width: DEFAULT_LINE_WIDTH,
        }
    }
}

impl Brush {
    fn point_at(&self, at: Point) -> StrokePoint {
        StrokePoint {
            x: at.x,
            y: at.y,
            color: self.color.clone(),
            line_width: self.line_width,
            tool: Some(self.tool),
        }
    }
}

pub struct DrawingEngine<S: Surface> {
    surface: S,
    brush: Brush,
    batch_size: usize,
    listeners: Option<ListenerSet>,
    generation: u64,
    /// Points of the local stroke not yet sent. `None` when no stroke is open.
    pending: Option<Vec<StrokePoint>>,
    /// A remote path is open on the surface.
    replaying: bool,
}

impl<S: Surface> DrawingEngine<S> {
    /// New engine over `surface`, starting disabled.
    pub fn new(surface: S, batch_size: usize) -> Self {
        Self {
            surface,
            brush: Brush::default(),
            batch_size: batch_size.max(1),
            listeners: None,
            generation: 0,
            pending: None,
            replaying: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn listeners(&self) -> Option<&ListenerSet> {
        self.listeners.as_ref()
    }

    pub fn is_stroking(&self) -> bool {
        self.pending.is_some()
    }

    // -- lifecycle ------------------------------------------------------------

    /// Tear down and rebuild the surface for the given permission. Returns the
    /// tail of a local stroke that was still open, if any.
    pub fn reinitialize(&mut self, can_draw: bool) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        self.end_stroke(&mut out);
        self.replaying = false;
        self.generation += 1;
        self.listeners = can_draw.then(|| ListenerSet::pointer(self.generation));
        self.surface.rebuild(self.listeners.as_ref());
        debug!(
            generation = self.generation,
            enabled = can_draw,
            "drawing surface rebuilt"
        );
        out
    }

    /// Wipe the surface without touching listeners.
    pub fn wipe(&mut self) {
        self.replaying = false;
        self.surface.clear();
    }

    // -- brush ----------------------------------------------------------------

    pub fn select_tool(&mut self, tool: Tool) {
        self.brush.tool = tool;
    }

    /// Pick a pen color. Switches back to the pen.
    pub fn select_color(&mut self, color: &str) -> Result<()> {
        if Rgba::parse(color).is_none() {
            return Err(ClientError::InvalidInput("unrecognized color"));
        }
        self.brush.color = color.trim().to_string();
        self.brush.tool = Tool::Pen;
        Ok(())
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<()> {
        if !(width.is_finite() && width > 0.0) {
            return Err(ClientError::InvalidInput("line width must be positive"));
        }
        self.brush.line_width = width;
        Ok(())
    }

    // -- capture --------------------------------------------------------------

    /// Turn one input event into outbound stroke messages.
    pub fn handle_input(&mut self, event: InputEvent, can_draw: bool) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        let bound = self
            .listeners
            .as_ref()
            .is_some_and(|l| l.binds(event.kind()));
        if !can_draw || !bound {
            trace!(?event, "input ignored, surface not listening");
            return out;
        }

        match event {
            InputEvent::MouseDown(at) | InputEvent::TouchStart(at) => {
                self.end_stroke(&mut out);
                let point = self.brush.point_at(at);
                self.surface
                    .begin_path(at.x, at.y, StrokeStyle::for_point(&point));
                self.pending = Some(Vec::with_capacity(self.batch_size));
                out.push(ClientMessage::DrawStart(point));
            }
            InputEvent::MouseMove(at) | InputEvent::TouchMove(at) => {
                let Some(pending) = self.pending.as_mut() else {
                    return out;
                };
                let point = self.brush.point_at(at);
                self.surface.line_to(at.x, at.y, StrokeStyle::for_point(&point));
                pending.push(point);
                if pending.len() >= self.batch_size {
                    out.push(ClientMessage::DrawMove(std::mem::take(pending)));
                }
            }
            InputEvent::MouseUp | InputEvent::MouseOut | InputEvent::TouchEnd => {
                self.end_stroke(&mut out);
            }
        }
        out
    }

    /// Wipe locally and tell the room.
    pub fn clear_canvas(&mut self, can_draw: bool) -> Result<Vec<ClientMessage>> {
        if !can_draw {
            return Err(ClientError::NotPermitted("only the drawer can clear"));
        }
        let mut out = Vec::new();
        self.end_stroke(&mut out);
        self.surface.clear();
        out.push(ClientMessage::ClearCanvas);
        Ok(out)
    }

    /// Flush the open stroke, if any, and close it.
    fn end_stroke(&mut self, out: &mut Vec<ClientMessage>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if !pending.is_empty() {
            out.push(ClientMessage::DrawMove(pending));
        }
        self.surface.close_path();
        out.push(ClientMessage::DrawEnd);
    }

    // -- replay ---------------------------------------------------------------

    /// Apply a stroke received from the drawer.
    pub fn replay(&mut self, command: StrokeCommand, is_drawer: bool) {
        if let StrokeCommand::Clear = command {
            self.wipe();
            return;
        }
        if is_drawer {
            trace!("own stroke echoed back; already rendered");
            return;
        }
        match command {
            StrokeCommand::Start(point) => {
                self.surface
                    .begin_path(point.x, point.y, StrokeStyle::for_point(&point));
                self.replaying = true;
            }
            StrokeCommand::Move(points) => {
                for point in points {
                    let style = StrokeStyle::for_point(&point);
                    if self.replaying {
                        self.surface.line_to(point.x, point.y, style);
                    } else {
                        // Joined mid-stroke: start from here.
                        self.surface.begin_path(point.x, point.y, style);
                        self.replaying = true;
                    }
                }
            }
            StrokeCommand::End => {
                if self.replaying {
                    self.surface.close_path();
                    self.replaying = false;
                }
            }
            StrokeCommand::Clear => {}
        }
    }
}
