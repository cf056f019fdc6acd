// Drawing surface seam.
//
// The drawing engine talks to pixels only through the `Surface` trait, the
// same way a browser script talks to a 2D canvas context: open a path at a
// point, extend it segment by segment with a per-segment style, close it,
// wipe everything. `rebuild` is the one lifecycle operation: it drops every
// listener attached so far, resets the pixel buffer and attaches the given
// `ListenerSet` (or none, leaving the surface inert but still drawable by
// remote replay).
//
// Two implementations ship: `RecordingSurface` below, which logs operations
// and is what the tests assert against, and `raster::RasterSurface`, which
// renders with tiny-skia.

use scribble_protocol::{StrokePoint, Tool};

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Pointer input a surface can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputKind {
    MouseDown,
    MouseMove,
    MouseUp,
    MouseOut,
    TouchStart,
    TouchMove,
    TouchEnd,
}

impl InputKind {
    pub const ALL: [InputKind; 7] = [
        InputKind::MouseDown,
        InputKind::MouseMove,
        InputKind::MouseUp,
        InputKind::MouseOut,
        InputKind::TouchStart,
        InputKind::TouchMove,
        InputKind::TouchEnd,
    ];
}

/// One generation of input bindings. A rebuild always replaces the whole set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerSet {
    pub generation: u64,
    pub bindings: Vec<InputKind>,
}

impl ListenerSet {
    /// Mouse and touch bindings for drawing.
    pub fn pointer(generation: u64) -> Self {
        Self {
            generation,
            bindings: InputKind::ALL.to_vec(),
        }
    }

    pub fn binds(&self, kind: InputKind) -> bool {
        self.bindings.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Composite {
    SourceOver,
    /// Cut-out: removes whatever the stroke covers.
    DestinationOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a CSS color as participants send it: `#rgb`, `#rrggbb` or
    /// `rgb(r, g, b)`.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        let inner = s
            .strip_prefix("rgb(")
            .or_else(|| s.strip_prefix("rgba("))?
            .strip_suffix(')')?;
        let mut channels = inner.split(',').map(|c| c.trim().parse::<u8>());
        let r = channels.next()?.ok()?;
        let g = channels.next()?.ok()?;
        let b = channels.next()?.ok()?;
        Some(Self::opaque(r, g, b))
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, slot) in out.iter_mut().enumerate() {
                let v = channel(&hex[i..=i])?;
                *slot = v * 17;
            }
            Some(Rgba::opaque(out[0], out[1], out[2]))
        }
        6 => Some(Rgba::opaque(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        _ => None,
    }
}

/// How one segment is painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub composite: Composite,
    pub color: Rgba,
    pub width: f32,
}

impl StrokeStyle {
    /// Resolve the style of a stroke point. Either eraser signal selects the
    /// cut-out blend with opaque black; unparseable pen colors fall back to
    /// black.
    pub fn for_point(point: &StrokePoint) -> Self {
        match point.resolved_tool() {
            Tool::Eraser => Self {
                composite: Composite::DestinationOut,
                color: Rgba::BLACK,
                width: point.line_width,
            },
            Tool::Pen => Self {
                composite: Composite::SourceOver,
                color: Rgba::parse(&point.color).unwrap_or(Rgba::BLACK),
                width: point.line_width,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

pub trait Surface {
    fn begin_path(&mut self, x: f32, y: f32, style: StrokeStyle);
    fn line_to(&mut self, x: f32, y: f32, style: StrokeStyle);
    fn close_path(&mut self);
    /// Wipe every pixel.
    fn clear(&mut self);
    /// Drop all attached listeners, reset pixels, attach `listeners`.
    fn rebuild(&mut self, listeners: Option<&ListenerSet>);
}

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    BeginPath { x: f32, y: f32, style: StrokeStyle },
    LineTo { x: f32, y: f32, style: StrokeStyle },
    ClosePath,
    Clear,
    Rebuild { generation: Option<u64> },
}

/// Surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    ops: Vec<SurfaceOp>,
    attached: Vec<ListenerSet>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// Listener sets currently attached. Never more than one.
    pub fn attached(&self) -> &[ListenerSet] {
        &self.attached
    }

    /// Path points in call order, as `(x, y)`.
    pub fn path_points(&self) -> Vec<(f32, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::BeginPath { x, y, .. } | SurfaceOp::LineTo { x, y, .. } => {
                    Some((*x, *y))
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }

    pub fn reset_log(&mut self) {
        self.ops.clear();
    }
}

impl Surface for RecordingSurface {
    fn begin_path(&mut self, x: f32, y: f32, style: StrokeStyle) {
        self.ops.push(SurfaceOp::BeginPath { x, y, style });
    }

    fn line_to(&mut self, x: f32, y: f32, style: StrokeStyle) {
        self.ops.push(SurfaceOp::LineTo { x, y, style });
    }

    fn close_path(&mut self) {
        self.ops.push(SurfaceOp::ClosePath);
    }

    fn clear(&mut self) {
        self.ops.push(SurfaceOp::Clear);
    }

    fn rebuild(&mut self, listeners: Option<&ListenerSet>) {
        self.attached.clear();
        self.attached.extend(listeners.cloned());
        self.ops.push(SurfaceOp::Rebuild {
            generation: listeners.map(|l| l.generation),
        });
    }
}
