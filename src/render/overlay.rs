// Text drawing helpers pass explicit geometry and color arguments.
#![allow(clippy::too_many_arguments)]

//! Caption composition and the CPU text overlay drawn on settled photos.

use std::fs;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query, Source};

use crate::render::compositor::Frame;

pub const DEFAULT_PLACE_LABEL: &str = "Ort";

/// Text shown on top of a settled photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caption {
    /// Date and place line, possibly empty.
    pub info: String,
    /// Path of the photo relative to the library root.
    pub path: String,
}

/// Compose the date and place line.
#[must_use]
pub fn caption_text(date: Option<&str>, place: Option<&str>, label: &str) -> String {
    match (date, place) {
        (Some(date), Some(place)) => format!("{date} | {label}: {place}"),
        (Some(date), None) => date.to_string(),
        (None, Some(place)) => format!("{label}: {place}"),
        (None, None) => String::new(),
    }
}

/// Find a sans-serif system font, preferring a few well-known families.
///
/// # Errors
/// Fails when no usable font face is installed.
pub fn load_font() -> Result<FontArc> {
    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Liberation Sans"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) {
            return load_face(&db, id);
        }
    }

    if let Some(face) = db.faces().next() {
        return load_face(&db, face.id);
    }

    Err(anyhow!("failed to load a system font for the caption overlay"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<FontArc> {
    let face = db.face(id).context("missing font face in database")?;
    let bytes = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    FontArc::try_from_vec(bytes).context("failed to decode font face")
}

const TEXT_COLOR: Color = Color::from_rgb(0xFF_FFFF);
const BACKDROP: Color = Color::from_rgb(0x00_0000);
const CLOCK_MARGIN: f32 = 5.0;
const CLOCK_TOP: f32 = 10.0;

/// Paints captions and the clock into a [`Frame`].
pub struct OverlayRenderer {
    font: FontArc,
    font_size: f32,
    clock_size: f32,
}

impl OverlayRenderer {
    /// `clock_size` of zero disables the clock.
    #[must_use]
    pub fn new(font: FontArc, font_size: u32, clock_size: u32) -> Self {
        Self {
            font,
            font_size: font_size as f32,
            clock_size: clock_size as f32,
        }
    }

    #[must_use]
    pub fn clock_enabled(&self) -> bool {
        self.clock_size > 0.0
    }

    /// Draw the caption lines along the bottom edge and, if given and enabled,
    /// the clock in the top right corner.
    pub fn paint(&self, frame: &mut Frame, caption: &Caption, clock: Option<&str>) {
        let width = frame.width();
        let height = frame.height();
        let buffer = frame.pixels_mut();
        let fs = self.font_size;
        let h = height as f32;

        // Path line sits above the info line; both are left aligned.
        self.label(buffer, width, height, &caption.path, 0.0, h - (2.0 * fs + 2.0), fs);
        self.label(buffer, width, height, &caption.info, 0.0, h - (fs + 1.0), fs);

        if let Some(clock) = clock.filter(|_| self.clock_enabled()) {
            let cs = self.clock_size;
            let text_width = measure_text(clock, &self.font, PxScale::from(cs));
            let left = (width as f32 - CLOCK_MARGIN - text_width).max(0.0);
            self.label(buffer, width, height, clock, left, CLOCK_TOP, cs);
        }
    }

    /// Text on an opaque black box whose top-left corner is `(left, top)`.
    fn label(
        &self,
        buffer: &mut [u32],
        width: u32,
        height: u32,
        text: &str,
        left: f32,
        top: f32,
        size: f32,
    ) {
        if text.is_empty() {
            return;
        }
        let scale = PxScale::from(size);
        let scaled = self.font.as_scaled(scale);
        let text_width = measure_text(text, &self.font, scale);
        let line_height = scaled.ascent() - scaled.descent();
        fill_rect(
            buffer,
            width,
            height,
            left,
            top,
            left + text_width,
            top + line_height,
            BACKDROP,
        );
        draw_text(
            buffer,
            width,
            height,
            &self.font,
            text,
            TEXT_COLOR,
            left,
            top + scaled.ascent(),
            scale,
        );
    }
}

fn draw_text(
    buffer: &mut [u32],
    width: u32,
    height: u32,
    font: &FontArc,
    text: &str,
    color: Color,
    left: f32,
    baseline: f32,
    scale: PxScale,
) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                blend_pixel(
                    buffer,
                    width,
                    height,
                    bounds.min.x + x as f32,
                    bounds.min.y + y as f32,
                    color,
                    coverage,
                );
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

fn measure_text(text: &str, font: &FontArc, scale: PxScale) -> f32 {
    let scaled_font = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph_id = scaled_font.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        previous = Some(glyph_id);
    }
    width.max(0.0)
}

fn fill_rect(
    buffer: &mut [u32],
    width: u32,
    height: u32,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
    color: Color,
) {
    let x0 = left.max(0.0).floor() as i32;
    let y0 = top.max(0.0).floor() as i32;
    let x1 = right.min(width as f32).ceil() as i32;
    let y1 = bottom.min(height as f32).ceil() as i32;
    for y in y0.max(0)..y1.min(height as i32) {
        for x in x0.max(0)..x1.min(width as i32) {
            blend_pixel(buffer, width, height, x as f32, y as f32, color, 1.0);
        }
    }
}

fn blend_pixel(
    buffer: &mut [u32],
    width: u32,
    height: u32,
    x: f32,
    y: f32,
    color: Color,
    coverage: f32,
) {
    if coverage <= 0.0 {
        return;
    }
    let xi = x.floor() as i32;
    let yi = y.floor() as i32;
    if xi < 0 || yi < 0 || xi >= width as i32 || yi >= height as i32 {
        return;
    }
    let idx = (yi as u32 * width + xi as u32) as usize;
    let alpha = coverage.clamp(0.0, 1.0);
    let dst = unpack_color(buffer[idx]);
    let src = color.rgb();
    let out = (
        src.0 * alpha + dst.0 * (1.0 - alpha),
        src.1 * alpha + dst.1 * (1.0 - alpha),
        src.2 * alpha + dst.2 * (1.0 - alpha),
    );
    buffer[idx] = pack_color(out);
}

fn unpack_color(value: u32) -> (f32, f32, f32) {
    let r = ((value >> 16) & 0xFF) as f32 / 255.0;
    let g = ((value >> 8) & 0xFF) as f32 / 255.0;
    let b = (value & 0xFF) as f32 / 255.0;
    (r, g, b)
}

fn pack_color(color: (f32, f32, f32)) -> u32 {
    let r = (color.0.clamp(0.0, 1.0) * 255.0).round() as u32;
    let g = (color.1.clamp(0.0, 1.0) * 255.0).round() as u32;
    let b = (color.2.clamp(0.0, 1.0) * 255.0).round() as u32;
    (r << 16) | (g << 8) | b
}

#[derive(Debug, Clone, Copy)]
struct Color {
    r: u8,
    g: u8,
    b: u8,
}

impl Color {
    const fn from_rgb(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    fn rgb(self) -> (f32, f32, f32) {
        (
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        )
    }
}
