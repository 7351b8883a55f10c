use std::fs;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query, Source};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const SHADOW: Rgb<u8> = Rgb([0, 0, 0]);

/// Line height as a fraction of the frame height.
const TEXT_SCALE: f32 = 1.0 / 12.0;

/// Off-screen frame the kiosk window presents.
pub struct Canvas {
    frame: RgbImage,
    font: Option<FontArc>,
}

impl Canvas {
    /// Without a font, messages are skipped and only pictures are drawn.
    pub fn new(size: (u32, u32), font: Option<FontArc>) -> Self {
        Self {
            frame: RgbImage::from_pixel(size.0.max(1), size.1.max(1), BACKGROUND),
            font,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.frame
    }

    /// Resize and clear.
    pub fn resize(&mut self, size: (u32, u32)) {
        if size != self.size() {
            self.frame = RgbImage::from_pixel(size.0.max(1), size.1.max(1), BACKGROUND);
        }
    }

    pub fn clear(&mut self) {
        for px in self.frame.pixels_mut() {
            *px = BACKGROUND;
        }
    }

    /// Scale `picture` to fill as much of the frame as possible, keeping its
    /// aspect ratio, and centre it.
    pub fn draw_picture(&mut self, picture: &DynamicImage) {
        let (fw, fh) = self.size();
        let (pw, ph) = (picture.width().max(1), picture.height().max(1));
        let scale = (fw as f64 / pw as f64).min(fh as f64 / ph as f64);
        let w = ((pw as f64 * scale).round() as u32).clamp(1, fw);
        let h = ((ph as f64 * scale).round() as u32).clamp(1, fh);

        let rgb = picture.to_rgb8();
        let scaled = if (w, h) == (pw, ph) {
            rgb
        } else {
            imageops::resize(&rgb, w, h, FilterType::Triangle)
        };
        let x = (fw - w) / 2;
        let y = (fh - h) / 2;
        imageops::replace(&mut self.frame, &scaled, i64::from(x), i64::from(y));
    }

    /// Centre each line horizontally and the block vertically. Leading and
    /// trailing spaces are kept so hand-aligned prompts line up with buttons.
    pub fn draw_message(&mut self, text: &str) {
        let Some(font) = self.font.clone() else {
            return;
        };
        let (fw, fh) = self.size();
        let scale = PxScale::from((fh as f32 * TEXT_SCALE).max(8.0));
        let scaled = font.as_scaled(scale);
        let line_height = scaled.ascent() - scaled.descent() + scaled.line_gap();
        let shadow = (scale.y / 24.0).max(1.0);

        let lines: Vec<&str> = text.lines().collect();
        let block = line_height * lines.len() as f32;
        let mut baseline = (fh as f32 - block) / 2.0 + scaled.ascent();
        for line in lines {
            let width = measure_text(line, &font, scale);
            let left = (fw as f32 - width) / 2.0;
            draw_text(
                &mut self.frame,
                &font,
                line,
                SHADOW,
                left + shadow,
                baseline + shadow,
                scale,
            );
            draw_text(&mut self.frame, &font, line, TEXT, left, baseline, scale);
            baseline += line_height;
        }
    }

    /// Frame as `0RGB` words for softbuffer.
    pub fn to_argb(&self) -> Vec<u32> {
        self.frame
            .pixels()
            .map(|Rgb([r, g, b])| {
                0xFF00_0000 | (u32::from(*r) << 16) | (u32::from(*g) << 8) | u32::from(*b)
            })
            .collect()
    }
}

fn measure_text(text: &str, font: &FontArc, scale: PxScale) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width.max(0.0)
}

fn draw_text(
    frame: &mut RgbImage,
    font: &FontArc,
    text: &str,
    color: Rgb<u8>,
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
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                blend_pixel(
                    frame,
                    bounds.min.x + x as f32,
                    bounds.min.y + y as f32,
                    color,
                    coverage,
                );
            });
        }
        cursor_x += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
}

fn blend_pixel(frame: &mut RgbImage, x: f32, y: f32, color: Rgb<u8>, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let (xi, yi) = (x.floor() as i64, y.floor() as i64);
    if xi < 0 || yi < 0 || xi >= i64::from(frame.width()) || yi >= i64::from(frame.height()) {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    let dst = frame.get_pixel_mut(xi as u32, yi as u32);
    for (d, s) in dst.0.iter_mut().zip(color.0) {
        *d = (f32::from(s) * alpha + f32::from(*d) * (1.0 - alpha)).round() as u8;
    }
}

/// First usable sans-serif face on the system.
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
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(anyhow!("no usable system font found"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    Ok(FontArc::try_from_vec(data).ok())
}
