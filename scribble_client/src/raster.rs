// Pixel-backed drawing surface.
//
// Renders strokes onto a tiny-skia `Pixmap`, mirroring 2D-canvas behavior:
// each `line_to` strokes the segment from the previous point with round caps
// and joins, pen segments blend source-over, eraser segments blend
// destination-out so they cut through to transparency. The pixmap starts
// transparent; PNG export composites nothing, so erased areas stay
// transparent in the file.

use std::path::Path;

use tiny_skia::{
    BlendMode, Color, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
};
use tracing::debug;

use crate::config::CanvasSize;
use crate::error::{ClientError, Result};
use crate::surface::{Composite, ListenerSet, StrokeStyle, Surface};

pub struct RasterSurface {
    pixmap: Pixmap,
    cursor: Option<(f32, f32)>,
    listener_generation: Option<u64>,
}

impl RasterSurface {
    pub fn new(size: CanvasSize) -> Result<Self> {
        let pixmap = Pixmap::new(size.width, size.height).ok_or_else(|| {
            ClientError::Canvas(format!("invalid size {}x{}", size.width, size.height))
        })?;
        Ok(Self {
            pixmap,
            cursor: None,
            listener_generation: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Generation of the attached listener set, `None` when disabled.
    pub fn listener_generation(&self) -> Option<u64> {
        self.listener_generation
    }

    /// Alpha of one pixel, `None` outside the surface.
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        self.pixmap.pixel(x, y).map(|p| p.alpha())
    }

    /// Straight (non-premultiplied) RGBA of one pixel.
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| ClientError::Canvas(e.to_string()))
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), "canvas written");
        Ok(())
    }

    fn stroke_segment(&mut self, from: (f32, f32), to: (f32, f32), style: StrokeStyle) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        let Some(path) = pb.finish() else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color_rgba8(style.color.r, style.color.g, style.color.b, style.color.a);
        paint.anti_alias = true;
        paint.blend_mode = match style.composite {
            Composite::SourceOver => BlendMode::SourceOver,
            Composite::DestinationOut => BlendMode::DestinationOut,
        };

        let stroke = Stroke {
            width: style.width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };

        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }
}

impl Surface for RasterSurface {
    fn begin_path(&mut self, x: f32, y: f32, _style: StrokeStyle) {
        self.cursor = Some((x, y));
    }

    fn line_to(&mut self, x: f32, y: f32, style: StrokeStyle) {
        let from = self.cursor.unwrap_or((x, y));
        self.stroke_segment(from, (x, y), style);
        self.cursor = Some((x, y));
    }

    fn close_path(&mut self) {
        self.cursor = None;
    }

    fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
        self.cursor = None;
    }

    fn rebuild(&mut self, listeners: Option<&ListenerSet>) {
        self.clear();
        self.listener_generation = listeners.map(|l| l.generation);
    }
}
