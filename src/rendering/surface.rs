use crate::core::geometry::{Point, Rect};
use crate::tiles::bitmap::TileBitmap;
use image::{Rgba, RgbaImage};

/// RGBA colour used by every draw call
pub type Color = Rgba<u8>;

pub const PLACEHOLDER_COLOR: Color = Rgba([48, 48, 52, 255]);
pub const BORDER_COLOR: Color = Rgba([200, 200, 200, 255]);
pub const BACKGROUND_COLOR: Color = Rgba([20, 20, 22, 255]);

/// Stroke parameters for outlines
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f64,
    /// Alternating dash/gap lengths in screen pixels; empty means solid
    pub dash: Vec<f64>,
}

impl StrokeStyle {
    pub fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: Vec::new(),
        }
    }

    pub fn dashed(color: Color, width: f64, dash: f64, gap: f64) -> Self {
        Self {
            color,
            width,
            dash: vec![dash, gap],
        }
    }

    pub fn is_dashed(&self) -> bool {
        !self.dash.is_empty()
    }
}

/// 2D drawing target the viewer paints into each frame.
///
/// Rectangles are in screen pixels. `draw_bitmap` stretches the `src`
/// sub-rectangle of `bitmap` (bitmap pixels) over `dst`; with `transpose`
/// the bitmap's x axis runs along the screen's y axis.
pub trait DrawSurface {
    fn size(&self) -> (f64, f64);
    fn clear(&mut self);
    fn draw_bitmap(&mut self, bitmap: &TileBitmap, src: Rect, dst: Rect, transpose: bool);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle);
    fn draw_label(&mut self, position: Point, text: &str, color: Color);
}

/// Commands captured by [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Bitmap {
        bitmap_size: (u32, u32),
        src: Rect,
        dst: Rect,
        transpose: bool,
    },
    FillRect {
        rect: Rect,
        color: Color,
    },
    StrokeRect {
        rect: Rect,
        style: StrokeStyle,
    },
    Label {
        position: Point,
        text: String,
        color: Color,
    },
}

/// Surface that only records what was drawn; used by tests and headless hosts
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    pub width: f64,
    pub height: f64,
    /// Commands of the current frame; `clear` empties the queue
    pub drawing_queue: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            drawing_queue: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.drawing_queue
    }

    pub fn bitmap_draws(&self) -> impl Iterator<Item = &DrawCommand> {
        self.drawing_queue
            .iter()
            .filter(|c| matches!(c, DrawCommand::Bitmap { .. }))
    }

    pub fn fills_of(&self, color: Color) -> usize {
        self.drawing_queue
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillRect { color: c, .. } if *c == color))
            .count()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.drawing_queue
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Label { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.drawing_queue.clear();
        self.drawing_queue.push(DrawCommand::Clear);
    }

    fn draw_bitmap(&mut self, bitmap: &TileBitmap, src: Rect, dst: Rect, transpose: bool) {
        self.drawing_queue.push(DrawCommand::Bitmap {
            bitmap_size: (bitmap.width(), bitmap.height()),
            src,
            dst,
            transpose,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.drawing_queue.push(DrawCommand::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle) {
        self.drawing_queue.push(DrawCommand::StrokeRect {
            rect,
            style: style.clone(),
        });
    }

    fn draw_label(&mut self, position: Point, text: &str, color: Color) {
        self.drawing_queue.push(DrawCommand::Label {
            position,
            text: text.to_string(),
            color,
        });
    }
}

/// Software rasteriser into an RGBA image (nearest-neighbour sampling).
///
/// Labels are drawn as a small marker only; text shaping is left to real
/// UI hosts.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND_COLOR),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel range covered by `rect`, clipped to the image
    fn pixel_span(&self, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
        let w = f64::from(self.image.width());
        let h = f64::from(self.image.height());
        let x0 = rect.x.max(0.0).floor();
        let y0 = rect.y.max(0.0).floor();
        let x1 = rect.right().min(w).ceil();
        let y1 = rect.bottom().min(h).ceil();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn blend(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.image.width() || y >= self.image.height() {
            return;
        }
        let alpha = u32::from(color[3]);
        if alpha == 255 {
            self.image.put_pixel(x, y, color);
            return;
        }
        let dst = self.image.get_pixel_mut(x, y);
        for i in 0..3 {
            let mixed = (u32::from(color[i]) * alpha + u32::from(dst[i]) * (255 - alpha)) / 255;
            dst[i] = mixed as u8;
        }
        dst[3] = 255;
    }
}

impl DrawSurface for RasterSurface {
    fn size(&self) -> (f64, f64) {
        (f64::from(self.image.width()), f64::from(self.image.height()))
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = BACKGROUND_COLOR;
        }
    }

    fn draw_bitmap(&mut self, bitmap: &TileBitmap, src: Rect, dst: Rect, transpose: bool) {
        if dst.is_empty() || src.is_empty() {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.pixel_span(&dst) else {
            return;
        };
        let source = bitmap.image();
        let max_x = source.width().saturating_sub(1);
        let max_y = source.height().saturating_sub(1);
        for y in y0..y1 {
            for x in x0..x1 {
                let u = (f64::from(x) + 0.5 - dst.x) / dst.width;
                let v = (f64::from(y) + 0.5 - dst.y) / dst.height;
                let (su, sv) = if transpose { (v, u) } else { (u, v) };
                let sx = (src.x + su * src.width).floor().max(0.0) as u32;
                let sy = (src.y + sv * src.height).floor().max(0.0) as u32;
                let pixel = *source.get_pixel(sx.min(max_x), sy.min(max_y));
                self.blend(x, y, pixel);
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some((x0, y0, x1, y1)) = self.pixel_span(&rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color);
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, style: &StrokeStyle) {
        let width = style.width.max(1.0);
        let period: f64 = style.dash.iter().sum();
        let on = |offset: f64| -> bool {
            if period <= 0.0 {
                return true;
            }
            let mut t = offset.rem_euclid(period);
            for (i, len) in style.dash.iter().enumerate() {
                if t < *len {
                    return i % 2 == 0;
                }
                t -= len;
            }
            true
        };

        let (w, h) = self.size();
        let bounds = Rect::new(0.0, 0.0, w, h);
        if !rect.x.is_finite() || !rect.y.is_finite() || !rect.intersects(&bounds.expanded(width)) {
            return;
        }
        // Only the on-screen part of each edge is walked; offsets stay relative
        // to the full rect so the dash pattern does not shift
        let first = |start: f64| start + (-1.0 - start).max(0.0).floor();
        let top = rect.y < h && rect.y + width > 0.0;
        let bottom = rect.bottom() > 0.0 && rect.bottom() - width < h;
        let left = rect.x < w && rect.x + width > 0.0;
        let right = rect.right() > 0.0 && rect.right() - width < w;

        let mut segments = Vec::new();
        let mut x = first(rect.x);
        let x_end = rect.right().min(w + 1.0);
        while x < x_end && (top || bottom) {
            if on(x - rect.x) {
                if top {
                    segments.push(Rect::new(x, rect.y, 1.0, width));
                }
                if bottom {
                    segments.push(Rect::new(x, rect.bottom() - width, 1.0, width));
                }
            }
            x += 1.0;
        }
        let mut y = first(rect.y);
        let y_end = rect.bottom().min(h + 1.0);
        while y < y_end && (left || right) {
            if on(y - rect.y) {
                if left {
                    segments.push(Rect::new(rect.x, y, width, 1.0));
                }
                if right {
                    segments.push(Rect::new(rect.right() - width, y, width, 1.0));
                }
            }
            y += 1.0;
        }
        for segment in segments {
            self.fill_rect(segment, style.color);
        }
    }

    fn draw_label(&mut self, position: Point, _text: &str, color: Color) {
        self.fill_rect(Rect::new(position.x, position.y, 4.0, 4.0), color);
    }
}
