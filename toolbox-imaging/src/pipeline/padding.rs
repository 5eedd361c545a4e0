//! Padding stage: grow the canvas with a filled border.

use image::imageops;
use serde::Deserialize;
use tracing::debug;

use crate::raster::{Background, RasterImage};

use super::default_enabled;

/// Largest inset applied on any one side.
pub const MAX_INSET: u32 = 4096;

/// Margins in pixels. Negative values are treated as zero and values above
/// [`MAX_INSET`] are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Insets {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl Insets {
    pub fn uniform(value: i32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    fn clamped(self) -> (u32, u32, u32, u32) {
        let clamp = |v: i32| (v.max(0) as u32).min(MAX_INSET);
        (
            clamp(self.top),
            clamp(self.right),
            clamp(self.bottom),
            clamp(self.left),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddingSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub padding: Insets,
    #[serde(default)]
    pub background_color: Background,
}

/// Place `source` at `(left, top)` on a canvas grown by `spec.padding`.
pub fn apply_padding(source: &RasterImage, spec: &PaddingSpec) -> RasterImage {
    let (top, right, bottom, left) = spec.padding.clamped();
    let width = source.width().saturating_add(left + right);
    let height = source.height().saturating_add(top + bottom);

    let mut canvas = spec.background_color.canvas(width, height);
    imageops::overlay(
        &mut canvas,
        source.pixels(),
        i64::from(left),
        i64::from(top),
    );

    debug!(
        padding = format!("{} {} {} {}", top, right, bottom, left),
        output_size = format!("{}x{}", width, height),
        background = ?spec.background_color,
        "Applied padding"
    );

    RasterImage(canvas)
}
