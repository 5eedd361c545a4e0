//! Geometric transform stage: resize, mirror and quarter-turn rotation.

use image::imageops::{self, FilterType};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::raster::{Background, RasterImage};

/// Clockwise rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "i32")]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Snap an arbitrary angle to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        let quarters = (f64::from(degrees) / 90.0).round() as i64;
        let rotation = match quarters.rem_euclid(4) {
            0 => Rotation::None,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        };
        if degrees.rem_euclid(90) != 0 {
            warn!(
                requested = degrees,
                applied = rotation.degrees(),
                "Rotation is not a multiple of 90 degrees, snapping to nearest quarter turn"
            );
        }
        rotation
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl From<i32> for Rotation {
    fn from(degrees: i32) -> Self {
        Self::from_degrees(degrees)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
}

impl TransformSpec {
    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::None && !self.flip_horizontal && !self.flip_vertical
    }
}

/// Target content size in pixels, applied before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
}

/// Draw `source` scaled to `target_width` x `target_height`, mirrored and
/// rotated as `spec` asks.
///
/// Mirroring happens in the content's own frame, then the result is turned
/// clockwise. For 90/270 the output canvas has width and height swapped so
/// nothing is clipped.
pub fn apply_transform(
    source: &RasterImage,
    target_width: u32,
    target_height: u32,
    spec: &TransformSpec,
    background: Background,
) -> RasterImage {
    let target_width = target_width.max(1);
    let target_height = target_height.max(1);

    let mut content = if (target_width, target_height) == (source.width(), source.height()) {
        source.pixels().clone()
    } else {
        imageops::resize(
            source.pixels(),
            target_width,
            target_height,
            FilterType::Triangle,
        )
    };

    if spec.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut content);
    }
    if spec.flip_vertical {
        imageops::flip_vertical_in_place(&mut content);
    }

    let rotated = match spec.rotation {
        Rotation::None => content,
        Rotation::Deg90 => imageops::rotate90(&content),
        Rotation::Deg180 => imageops::rotate180(&content),
        Rotation::Deg270 => imageops::rotate270(&content),
    };

    let canvas = match background {
        Background::Transparent => rotated,
        Background::Solid(_) => {
            let mut canvas = background.canvas(rotated.width(), rotated.height());
            imageops::overlay(&mut canvas, &rotated, 0, 0);
            canvas
        }
    };

    debug!(
        target_size = format!("{}x{}", target_width, target_height),
        output_size = format!("{}x{}", canvas.width(), canvas.height()),
        rotation = spec.rotation.degrees(),
        flip_horizontal = spec.flip_horizontal,
        flip_vertical = spec.flip_vertical,
        "Applied geometric transform"
    );

    RasterImage(canvas)
}
