//! Collage assembly: four shots composed into a display grid or a print strip.
//!
//! Layout maths is kept apart from pixel work so the geometry can be checked
//! at startup against the configured sizes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;

use crate::config::ColorMode;

pub const PICTURES_PER_COLLAGE: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("canvas {width}x{height} leaves no room for the pictures")]
    CanvasTooSmall { width: u32, height: u32 },
    #[error("expected {expected} pictures, got {actual}")]
    PictureCount { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Corner of a cell a smaller thumbnail is pushed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index of the source picture shown in this slot.
    pub picture: usize,
    pub cell: Cell,
    pub anchor: Anchor,
}

impl Slot {
    pub fn origin(&self, width: u32, height: u32) -> (u32, u32) {
        let Cell {
            x,
            y,
            width: cw,
            height: ch,
        } = self.cell;
        let right = x + cw.saturating_sub(width);
        let bottom = y + ch.saturating_sub(height);
        match self.anchor {
            Anchor::TopLeft => (x, y),
            Anchor::TopRight => (right, y),
            Anchor::BottomLeft => (x, bottom),
            Anchor::BottomRight => (right, bottom),
        }
    }
}

/// 2x2 grid for the screen.
///
/// ```text
///   |  a |    w    | 2b |    w    | a  |
///   +----+---------+----+---------+----+   a
///   |    |    0    |    |    1    |    |   h
///   |                                  |   2b
///   |    |    2    |    |    3    |    |   h
///   +----+---------+----+---------+----+   a
/// ```
///
/// Thumbnails hug the centre of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub outer_border: u32,
    pub inner_border: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            outer_border: 40,
            inner_border: 20,
        }
    }
}

impl GridLayout {
    pub fn thumb_size(&self, size: (u32, u32)) -> Result<(u32, u32), LayoutError> {
        let (w, h) = size;
        let border = self.outer_border + self.inner_border;
        let tw = (w / 2).checked_sub(border).filter(|v| *v > 0);
        let th = (h / 2).checked_sub(border).filter(|v| *v > 0);
        match (tw, th) {
            (Some(tw), Some(th)) => Ok((tw, th)),
            _ => Err(LayoutError::CanvasTooSmall {
                width: w,
                height: h,
            }),
        }
    }

    pub fn cells(&self, size: (u32, u32)) -> Result<Vec<Slot>, LayoutError> {
        let (tw, th) = self.thumb_size(size)?;
        let (cx, cy) = (size.0 / 2, size.1 / 2);
        let b = self.inner_border;
        let left = cx - b - tw;
        let top = cy - b - th;
        let slot = |picture, x, y, anchor| Slot {
            picture,
            cell: Cell {
                x,
                y,
                width: tw,
                height: th,
            },
            anchor,
        };
        Ok(vec![
            slot(0, left, top, Anchor::BottomRight),
            slot(1, cx + b, top, Anchor::BottomLeft),
            slot(2, left, cy + b, Anchor::TopRight),
            slot(3, cx + b, cy + b, Anchor::TopLeft),
        ])
    }
}

/// Portrait strip for printing: four rows, each picture twice side by side,
/// so the sheet can be cut into two identical strips.
///
/// ```text
///   | ax |    w    | bx |    w    | ax |
///   +----+---------+----+---------+----+   ay
///   |    |    0    |    |    0    |    |   h
///   |                                  |   by
///   |    |    1    |    |    1    |    |   h
///   ...
///   |    |    3    |    |    3    |    |   h
///   +----+---------+----+---------+----+   ay
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintLayout {
    pub outer_border_x: u32,
    pub outer_border_y: u32,
    pub inner_border_x: u32,
    pub inner_border_y: u32,
}

impl Default for PrintLayout {
    fn default() -> Self {
        Self {
            outer_border_x: 0,
            outer_border_y: 110,
            inner_border_x: 20,
            inner_border_y: 10,
        }
    }
}

impl PrintLayout {
    pub fn thumb_size(&self, size: (u32, u32)) -> Result<(u32, u32), LayoutError> {
        let (w, h) = size;
        let rows = PICTURES_PER_COLLAGE as u32;
        let tw = w
            .checked_sub(2 * self.outer_border_x + self.inner_border_x)
            .map(|v| v / 2)
            .filter(|v| *v > 0);
        let th = h
            .checked_sub(2 * self.outer_border_y + (rows - 1) * self.inner_border_y)
            .map(|v| v / rows)
            .filter(|v| *v > 0);
        match (tw, th) {
            (Some(tw), Some(th)) => Ok((tw, th)),
            _ => Err(LayoutError::CanvasTooSmall {
                width: w,
                height: h,
            }),
        }
    }

    pub fn cells(&self, size: (u32, u32)) -> Result<Vec<Slot>, LayoutError> {
        let (tw, th) = self.thumb_size(size)?;
        let columns = [
            self.outer_border_x,
            self.outer_border_x + tw + self.inner_border_x,
        ];
        let mut slots = Vec::with_capacity(PICTURES_PER_COLLAGE * columns.len());
        for picture in 0..PICTURES_PER_COLLAGE {
            let y = self.outer_border_y + picture as u32 * (th + self.inner_border_y);
            for x in columns {
                slots.push(Slot {
                    picture,
                    cell: Cell {
                        x,
                        y,
                        width: tw,
                        height: th,
                    },
                    anchor: Anchor::TopLeft,
                });
            }
        }
        Ok(slots)
    }
}

/// Largest size that fits `bounds` with the source aspect ratio, never
/// enlarging the source.
pub fn fit_within(src: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (src.0.max(1) as f32, src.1.max(1) as f32);
    let (bw, bh) = (bounds.0.max(1) as f32, bounds.1.max(1) as f32);
    let scale = (bw / sw).min(bh / sh).min(1.0);
    let w = (sw * scale).round().clamp(1.0, bw);
    let h = (sh * scale).round().clamp(1.0, bh);
    (w as u32, h as u32)
}

fn thumbnail(image: &DynamicImage, bounds: (u32, u32), filter: FilterType) -> RgbImage {
    let rgb = image.to_rgb8();
    let (w, h) = fit_within(rgb.dimensions(), bounds);
    if (w, h) == rgb.dimensions() {
        rgb
    } else {
        imageops::resize(&rgb, w, h, filter)
    }
}

fn compose(
    images: &[DynamicImage],
    size: (u32, u32),
    thumb_size: (u32, u32),
    slots: &[Slot],
    background: Rgb<u8>,
    filter: FilterType,
) -> Result<RgbImage, LayoutError> {
    if images.len() != PICTURES_PER_COLLAGE {
        return Err(LayoutError::PictureCount {
            expected: PICTURES_PER_COLLAGE,
            actual: images.len(),
        });
    }
    let thumbs: Vec<RgbImage> = images
        .iter()
        .map(|img| thumbnail(img, thumb_size, filter))
        .collect();

    let mut canvas = RgbImage::from_pixel(size.0, size.1, background);
    for slot in slots {
        let thumb = &thumbs[slot.picture];
        let (x, y) = slot.origin(thumb.width(), thumb.height());
        imageops::replace(&mut canvas, thumb, i64::from(x), i64::from(y));
    }
    Ok(canvas)
}

/// Screen collage on a black background, exactly `size` pixels.
pub fn compose_grid(images: &[DynamicImage], size: (u32, u32)) -> Result<RgbImage, LayoutError> {
    let layout = GridLayout::default();
    let slots = layout.cells(size)?;
    compose(
        images,
        size,
        layout.thumb_size(size)?,
        &slots,
        Rgb([0, 0, 0]),
        FilterType::Triangle,
    )
}

/// Print sheet on a white background, exactly `size` pixels.
pub fn compose_print(images: &[DynamicImage], size: (u32, u32)) -> Result<RgbImage, LayoutError> {
    let layout = PrintLayout::default();
    let slots = layout.cells(size)?;
    compose(
        images,
        size,
        layout.thumb_size(size)?,
        &slots,
        Rgb([255, 255, 255]),
        FilterType::Lanczos3,
    )
}

pub fn apply_color_mode(image: RgbImage, mode: ColorMode) -> DynamicImage {
    let image = DynamicImage::ImageRgb8(image);
    match mode {
        ColorMode::Color => image,
        ColorMode::Grayscale => image.grayscale(),
    }
}

pub fn save_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    image
        .write_with_encoder(encoder)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([value, value, value])))
    }

    #[test]
    fn grid_cells_hug_the_centre() {
        let slots = GridLayout::default().cells((1366, 768)).unwrap();
        // thumb box = (683 - 60, 384 - 60)
        assert_eq!(slots[0].cell, Cell { x: 40, y: 40, width: 623, height: 324 });
        assert_eq!(slots[3].cell.x, 703);
        assert_eq!(slots[3].cell.y, 404);
        // A narrow picture in slot 0 is pushed towards the centre.
        assert_eq!(slots[0].origin(400, 324), (263, 40));
        assert_eq!(slots[1].origin(400, 300), (703, 64));
    }

    #[test]
    fn print_rows_repeat_each_picture() {
        let slots = PrintLayout::default().cells((1568, 2352)).unwrap();
        assert_eq!(slots.len(), 8);
        assert_eq!(PrintLayout::default().thumb_size((1568, 2352)).unwrap(), (774, 525));
        let rows: Vec<u32> = slots.iter().step_by(2).map(|s| s.cell.y).collect();
        assert_eq!(rows, vec![110, 645, 1180, 1715]);
        assert_eq!(slots[0].picture, slots[1].picture);
        assert_eq!(slots[1].cell.x, 794);
    }

    #[test]
    fn tiny_canvas_is_rejected() {
        assert_eq!(
            GridLayout::default().cells((100, 100)),
            Err(LayoutError::CanvasTooSmall {
                width: 100,
                height: 100
            })
        );
        assert!(PrintLayout::default().cells((600, 200)).is_err());
    }

    #[test]
    fn fit_within_keeps_aspect_and_never_upscales() {
        assert_eq!(fit_within((3000, 2000), (623, 324)), (486, 324));
        assert_eq!(fit_within((100, 50), (623, 324)), (100, 50));
    }

    #[test]
    fn grid_output_has_canvas_size_and_places_pictures() {
        let images: Vec<_> = (1..=4).map(|v| solid(300, 200, v * 50)).collect();
        let out = compose_grid(&images, (800, 600)).unwrap();
        assert_eq!(out.dimensions(), (800, 600));
        // Slot 3 starts at the centre plus the inner border.
        assert_eq!(out.get_pixel(420, 320), &Rgb([200, 200, 200]));
        assert_eq!(out.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn print_output_has_white_background() {
        let images: Vec<_> = (0..4).map(|_| solid(60, 40, 10)).collect();
        let out = compose_print(&images, (400, 900)).unwrap();
        assert_eq!(out.dimensions(), (400, 900));
        assert_eq!(out.get_pixel(5, 5), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(5, 115), &Rgb([10, 10, 10]));
    }

    #[test]
    fn wrong_picture_count_is_an_error() {
        let images = vec![solid(10, 10, 1)];
        assert_eq!(
            compose_grid(&images, (800, 600)),
            Err(LayoutError::PictureCount {
                expected: 4,
                actual: 1
            })
        );
    }
}
