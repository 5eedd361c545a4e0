//! The image transformation pipeline.
//!
//! Stages run in a fixed order, each optional:
//! crop -> resize/rotate/flip -> color filters -> padding -> watermark.
//! Every stage takes a `RasterImage` and returns a new one.

pub mod crop;
pub mod filter;
pub mod padding;
pub mod transform;
pub mod watermark;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConversionResult;
use crate::raster::{Background, RasterImage};

pub use crop::{CropArea, CropSpec, crop};
pub use filter::{FilterSpec, apply_filters};
pub use padding::{Insets, PaddingSpec, apply_padding};
pub use transform::{ResizeSpec, Rotation, TransformSpec, apply_transform};
pub use watermark::{
    Anchor, ImageWatermark, PreparedWatermark, TextWatermark, WatermarkContent, WatermarkSource,
    WatermarkSpec, apply_watermark, prepare_watermark,
};

pub(crate) fn default_enabled() -> bool {
    true
}

/// Edit options for one conversion. `None` skips a stage entirely.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub resize: Option<ResizeSpec>,
    pub transform: Option<TransformSpec>,
    pub crop: Option<CropSpec>,
    pub padding: Option<PaddingSpec>,
    pub watermark: Option<WatermarkSpec>,
    pub filter: Option<FilterSpec>,
}

impl PipelineOptions {
    /// True when no stage would change the image.
    pub fn is_identity(&self) -> bool {
        self.resize.is_none()
            && self.transform.is_none_or(|t| t.is_identity())
            && self.crop.is_none_or(|c| !c.enabled)
            && self.padding.is_none_or(|p| !p.enabled)
            && self.watermark.as_ref().is_none_or(|w| !w.enabled)
            && self.filter.is_none_or(|f| !f.enabled)
    }
}

/// Run the synchronous stages over a decoded source.
///
/// `background` fills canvas area the source does not cover (crop past the
/// edges, transform onto an opaque canvas). The watermark must already be
/// prepared with [`prepare_watermark`].
pub fn run_stages(
    source: RasterImage,
    options: &PipelineOptions,
    background: Background,
    watermark: Option<&PreparedWatermark>,
) -> RasterImage {
    let mut canvas = source;

    if let Some(spec) = options.crop.as_ref().filter(|c| c.enabled) {
        canvas = crop(&canvas, &spec.area, background);
    }

    // Size target is established after cropping
    let (target_width, target_height) = options
        .resize
        .map(|r| (r.width, r.height))
        .unwrap_or((canvas.width(), canvas.height()));
    let resizes = (target_width, target_height) != (canvas.width(), canvas.height());
    let transform = options.transform.unwrap_or_default();
    if resizes || !transform.is_identity() {
        canvas = apply_transform(&canvas, target_width, target_height, &transform, background);
    }

    if let Some(spec) = options.filter.as_ref().filter(|f| f.enabled) {
        canvas = apply_filters(&canvas, spec);
    }

    if let Some(spec) = options.padding.as_ref().filter(|p| p.enabled) {
        canvas = apply_padding(&canvas, spec);
    }

    // Anchors are relative to the final output size, so this runs last
    if let Some(prepared) = watermark {
        canvas = apply_watermark(&canvas, prepared);
    }

    debug!(
        output_size = format!("{}x{}", canvas.width(), canvas.height()),
        "Pipeline stages complete"
    );

    canvas
}

/// Prepare the watermark, then run every stage off the async runtime.
pub async fn process(
    source: RasterImage,
    options: &PipelineOptions,
    background: Background,
) -> ConversionResult<RasterImage> {
    if options.is_identity() {
        return Ok(source);
    }

    let watermark = match &options.watermark {
        Some(spec) => prepare_watermark(spec).await,
        None => None,
    };
    let options = options.clone();

    let canvas = tokio::task::spawn_blocking(move || {
        run_stages(source, &options, background, watermark.as_ref())
    })
    .await?;

    Ok(canvas)
}
