//! Crop stage: copy a caller-chosen rectangle into a new canvas.

use image::imageops;
use serde::Deserialize;
use tracing::debug;

use crate::raster::{Background, RasterImage};

use super::default_enabled;

/// Crop rectangle in source-pixel coordinates.
///
/// `x`/`y` may be negative and the rectangle may extend past the source;
/// the uncovered part of the result shows the pipeline background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropArea {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub area: CropArea,
}

/// Extract `area` from `source` into a canvas of exactly `width` x `height`.
pub fn crop(source: &RasterImage, area: &CropArea, background: Background) -> RasterImage {
    let width = area.width.max(1);
    let height = area.height.max(1);
    let mut canvas = background.canvas(width, height);

    // Overlap between the requested rectangle and the source bounds
    let left = area.x.max(0);
    let top = area.y.max(0);
    let right = area
        .x
        .saturating_add(i64::from(width))
        .min(i64::from(source.width()));
    let bottom = area
        .y
        .saturating_add(i64::from(height))
        .min(i64::from(source.height()));

    if right > left && bottom > top {
        let region = imageops::crop_imm(
            source.pixels(),
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();
        imageops::overlay(
            &mut canvas,
            &region,
            left.saturating_sub(area.x),
            top.saturating_sub(area.y),
        );
    }

    debug!(
        area = format!("({},{}) {}x{}", area.x, area.y, width, height),
        source_size = format!("{}x{}", source.width(), source.height()),
        overlap = right > left && bottom > top,
        "Cropped image"
    );

    RasterImage(canvas)
}
