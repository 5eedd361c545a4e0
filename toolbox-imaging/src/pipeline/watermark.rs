//! Watermark stage: composite text or a secondary image at an anchor.
//!
//! The watermark image is decoded before the synchronous stages run. If it
//! cannot be read or decoded the stage logs a warning and the conversion
//! continues without a watermark; one bad asset must not fail a batch.

use std::path::PathBuf;

use bytes::Bytes;
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ConversionError, ConversionResult};
use crate::raster::{Color, RasterImage};

use super::default_enabled;

/// Native glyph size of the built-in bitmap font.
const GLYPH_SIZE: u32 = 8;

/// One of nine placements on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

/// Reference point plus the alignment that ties a drawn box to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoint {
    pub x: f32,
    pub y: f32,
    pub align: HorizontalAlign,
    pub baseline: VerticalAlign,
}

impl Anchor {
    pub fn resolve(self, width: u32, height: u32, margin: u32) -> AnchorPoint {
        let (width, height, margin) = (width as f32, height as f32, margin as f32);
        let (x, align) = match self {
            Anchor::TopLeft | Anchor::MiddleLeft | Anchor::BottomLeft => {
                (margin, HorizontalAlign::Left)
            }
            Anchor::TopCenter | Anchor::Center | Anchor::BottomCenter => {
                (width / 2.0, HorizontalAlign::Center)
            }
            Anchor::TopRight | Anchor::MiddleRight | Anchor::BottomRight => {
                (width - margin, HorizontalAlign::Right)
            }
        };
        let (y, baseline) = match self {
            Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight => (margin, VerticalAlign::Top),
            Anchor::MiddleLeft | Anchor::Center | Anchor::MiddleRight => {
                (height / 2.0, VerticalAlign::Middle)
            }
            Anchor::BottomLeft | Anchor::BottomCenter | Anchor::BottomRight => {
                (height - margin, VerticalAlign::Bottom)
            }
        };
        AnchorPoint {
            x,
            y,
            align,
            baseline,
        }
    }
}

impl AnchorPoint {
    /// Top-left corner for a box of the given size so the alignment holds.
    pub fn origin(&self, box_width: u32, box_height: u32) -> (i64, i64) {
        let x = match self.align {
            HorizontalAlign::Left => self.x,
            HorizontalAlign::Center => self.x - box_width as f32 / 2.0,
            HorizontalAlign::Right => self.x - box_width as f32,
        };
        let y = match self.baseline {
            VerticalAlign::Top => self.y,
            VerticalAlign::Middle => self.y - box_height as f32 / 2.0,
            VerticalAlign::Bottom => self.y - box_height as f32,
        };
        (x.round() as i64, y.round() as i64)
    }
}

/// Where the watermark image comes from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "PathBuf")]
pub enum WatermarkSource {
    File(PathBuf),
    Encoded(Bytes),
}

impl From<PathBuf> for WatermarkSource {
    fn from(path: PathBuf) -> Self {
        WatermarkSource::File(path)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWatermark {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub font_color: Color,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub font_bold: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageWatermark {
    pub image: WatermarkSource,
    /// Largest fraction of the canvas either dimension may cover.
    #[serde(default = "default_image_size")]
    pub size: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkContent {
    Text(TextWatermark),
    Image(ImageWatermark),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatermarkSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub content: WatermarkContent,
    #[serde(default)]
    pub position: Anchor,
    #[serde(default = "default_margin")]
    pub margin: u32,
}

fn default_font_size() -> u32 {
    24
}

fn default_opacity() -> f32 {
    0.5
}

fn default_image_size() -> f32 {
    0.2
}

fn default_margin() -> u32 {
    20
}

/// A watermark whose assets are decoded and ready to draw.
#[derive(Debug, Clone)]
pub struct PreparedWatermark {
    pub position: Anchor,
    pub margin: u32,
    pub mark: Mark,
}

#[derive(Debug, Clone)]
pub enum Mark {
    Text(TextWatermark),
    Image {
        bitmap: RgbaImage,
        size: f32,
        opacity: f32,
    },
}

/// Load whatever the watermark needs before drawing.
///
/// Returns `None` when the watermark is disabled or its image cannot be
/// loaded; the latter is logged and otherwise ignored.
pub async fn prepare_watermark(spec: &WatermarkSpec) -> Option<PreparedWatermark> {
    if !spec.enabled {
        return None;
    }

    let mark = match &spec.content {
        WatermarkContent::Text(text) => Mark::Text(text.clone()),
        WatermarkContent::Image(image) => match load_watermark_image(&image.image).await {
            Ok(bitmap) => Mark::Image {
                bitmap,
                size: image.size,
                opacity: image.opacity,
            },
            Err(e) => {
                warn!(
                    error = %e.detailed_message(),
                    "Watermark image could not be loaded, continuing without watermark"
                );
                return None;
            }
        },
    };

    Some(PreparedWatermark {
        position: spec.position,
        margin: spec.margin,
        mark,
    })
}

async fn load_watermark_image(source: &WatermarkSource) -> ConversionResult<RgbaImage> {
    let (name, data) = match source {
        WatermarkSource::File(path) => {
            let name = path.display().to_string();
            let data = tokio::fs::read(path)
                .await
                .map_err(|source| ConversionError::Read {
                    name: name.clone(),
                    source,
                })?;
            (name, Bytes::from(data))
        }
        WatermarkSource::Encoded(data) => ("watermark image".to_string(), data.clone()),
    };

    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&data)
            .map(|decoded| decoded.to_rgba8())
            .map_err(|source| ConversionError::Decode { name, source })
    })
    .await?
}

/// Composite a prepared watermark onto a copy of `canvas`.
pub fn apply_watermark(canvas: &RasterImage, watermark: &PreparedWatermark) -> RasterImage {
    let anchor = watermark
        .position
        .resolve(canvas.width(), canvas.height(), watermark.margin);
    let mut output = canvas.pixels().clone();

    match &watermark.mark {
        Mark::Text(text) => {
            let opacity = clamp_opacity(text.opacity);
            if opacity <= 0.0 || text.text.is_empty() {
                return canvas.clone();
            }
            let chars: Vec<char> = text.text.chars().collect();
            let layout =
                TextLayout::new(chars.len(), text.font_size, text.font_bold, canvas.height());
            let (x, y) = anchor.origin(layout.width, layout.height);

            // Only the part of the text box that lands on the canvas is rasterized
            let visible_start = (-x).max(0);
            let visible_end =
                i64::from(layout.width).min(i64::from(canvas.width()).saturating_sub(x));
            if visible_end > visible_start {
                let mask = render_text_mask(&chars, &layout, visible_start, visible_end);
                blend_mask(
                    &mut output,
                    &mask,
                    x + visible_start,
                    y,
                    text.font_color.0,
                    opacity,
                );
            }
            debug!(
                chars = chars.len(),
                font_size = text.font_size,
                glyph_scale = layout.scale,
                position = ?watermark.position,
                origin = format!("({},{})", x, y),
                "Applied text watermark"
            );
        }
        Mark::Image {
            bitmap,
            size,
            opacity,
        } => {
            let opacity = clamp_opacity(*opacity);
            let Some(scaled) = scale_to_fraction(bitmap, canvas.width(), canvas.height(), *size)
            else {
                return canvas.clone();
            };
            if opacity <= 0.0 {
                return canvas.clone();
            }
            let (x, y) = anchor.origin(scaled.width(), scaled.height());
            blend_image(&mut output, &scaled, x, y, opacity);
            debug!(
                watermark_size = format!("{}x{}", scaled.width(), scaled.height()),
                position = ?watermark.position,
                origin = format!("({},{})", x, y),
                "Applied image watermark"
            );
        }
    }

    RasterImage(output)
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_finite() {
        opacity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Scale so neither side exceeds `fraction` of the canvas, keeping aspect.
fn scale_to_fraction(
    bitmap: &RgbaImage,
    canvas_width: u32,
    canvas_height: u32,
    fraction: f32,
) -> Option<RgbaImage> {
    if !fraction.is_finite() || fraction <= 0.0 || bitmap.width() == 0 || bitmap.height() == 0 {
        return None;
    }
    let fraction = fraction.min(1.0);
    let scale = (canvas_width as f32 * fraction / bitmap.width() as f32)
        .min(canvas_height as f32 * fraction / bitmap.height() as f32);
    let width = ((bitmap.width() as f32 * scale).round() as u32).max(1);
    let height = ((bitmap.height() as f32 * scale).round() as u32).max(1);

    if (width, height) == bitmap.dimensions() {
        Some(bitmap.clone())
    } else {
        Some(imageops::resize(bitmap, width, height, FilterType::Triangle))
    }
}

/// Glyph scale and box size for one line of bitmap text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextLayout {
    scale: u32,
    /// Extra pixels added to the right of every stroke for bold text
    weight: u32,
    cell: u32,
    width: u32,
    height: u32,
}

impl TextLayout {
    /// Glyphs scale by nearest neighbour to roughly `font_size` pixels tall,
    /// but a glyph cell is never taller than `max_height`.
    fn new(char_count: usize, font_size: u32, bold: bool, max_height: u32) -> Self {
        let requested = (font_size as f32 / GLYPH_SIZE as f32).round() as u32;
        let scale = requested.min(max_height / GLYPH_SIZE).max(1);
        let cell = GLYPH_SIZE * scale;
        let weight = if bold { (scale / 4).max(1) } else { 0 };
        let width = u64::try_from(char_count)
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(cell))
            .saturating_add(u64::from(weight))
            .clamp(1, u64::from(u32::MAX)) as u32;
        Self {
            scale,
            weight,
            cell,
            width,
            height: cell,
        }
    }
}

/// Rasterize columns `start..end` of a single line of text with the 8x8
/// bitmap font. Column 0 is the left edge of the text box.
fn render_text_mask(chars: &[char], layout: &TextLayout, start: i64, end: i64) -> GrayImage {
    let mut mask = GrayImage::new((end - start).max(1) as u32, layout.height);
    let (scale, cell) = (i64::from(layout.scale), i64::from(layout.cell));
    let stroke = scale + i64::from(layout.weight);

    // Bold strokes can spill one cell to the right, so start a glyph early
    let first = usize::try_from((start / cell).saturating_sub(1)).unwrap_or(0);

    for (index, ch) in chars.iter().enumerate().skip(first) {
        let cursor_x = (index as i64).saturating_mul(cell);
        if cursor_x >= end {
            break;
        }
        let glyph = BASIC_FONTS
            .get(*ch)
            .or_else(|| LATIN_FONTS.get(*ch))
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..i64::from(GLYPH_SIZE) {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let base_x = cursor_x + col * scale;
                let base_y = row as u32 * layout.scale;
                for dx in 0..stroke {
                    let px = base_x + dx;
                    if px < start || px >= end {
                        continue;
                    }
                    for dy in 0..layout.scale {
                        mask.put_pixel((px - start) as u32, base_y + dy, Luma([255]));
                    }
                }
            }
        }
    }

    mask
}

fn blend_mask(
    target: &mut RgbaImage,
    mask: &GrayImage,
    x: i64,
    y: i64,
    color: Rgba<u8>,
    opacity: f32,
) {
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage[0] == 0 {
            continue;
        }
        let tx = x + i64::from(mx);
        let ty = y + i64::from(my);
        if tx < 0
            || ty < 0
            || tx >= i64::from(target.width())
            || ty >= i64::from(target.height())
        {
            continue;
        }
        let pixel_opacity = opacity * f32::from(coverage[0]) / 255.0;
        let dst = target.get_pixel_mut(tx as u32, ty as u32);
        *dst = blend_pixels(*dst, color, pixel_opacity);
    }
}

fn blend_image(target: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64, opacity: f32) {
    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + i64::from(overlay.width())).min(i64::from(target.width()));
    let y_end = (y + i64::from(overlay.height())).min(i64::from(target.height()));

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let src = *overlay.get_pixel((tx - x) as u32, (ty - y) as u32);
            let dst = target.get_pixel_mut(tx as u32, ty as u32);
            *dst = blend_pixels(*dst, src, opacity);
        }
    }
}

/// Porter-Duff "over" with an extra opacity multiplier on the foreground.
fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = f32::from(foreground[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if fg_alpha <= 0.0 {
        return background;
    }
    let bg_alpha = f32::from(background[3]) / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = f32::from(fg) / 255.0;
        let bg_f = f32::from(bg) / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
