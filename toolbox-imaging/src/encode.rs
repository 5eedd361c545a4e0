//! Raster encoders for the image output formats.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{ConversionError, ConversionResult};
use crate::format::{OutputFormat, normalize_quality, quality_percent};
use crate::raster::RasterImage;

/// Encode a finished canvas as JPEG, PNG or WEBP.
///
/// `quality` is on a 0..1 scale. PNG ignores it. WEBP below 1.0 reduces the
/// color palette before the lossless encoder runs, so lower values still give
/// smaller files.
pub fn encode_raster(
    image: &RasterImage,
    format: OutputFormat,
    quality: f32,
) -> ConversionResult<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let mut buffer = Vec::new();

    let result = match format {
        OutputFormat::Jpeg => {
            let rgb = flatten_onto_white(image.pixels());
            let encoder =
                JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality_percent(quality));
            encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(Cursor::new(&mut buffer));
            encoder.write_image(
                image.pixels().as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )
        }
        OutputFormat::Webp => {
            let mut rgba = image.pixels().clone();
            let quality = normalize_quality(quality);
            if quality < 1.0 {
                quantize_rgb(&mut rgba, quality);
            }
            let encoder = WebPEncoder::new_lossless(Cursor::new(&mut buffer));
            encoder.write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
        OutputFormat::Pdf => return Err(ConversionError::UnsupportedFormat { format }),
    };
    result.map_err(|source| ConversionError::Encode { format, source })?;

    debug!(
        format = %format,
        size = format!("{}x{}", width, height),
        bytes = buffer.len(),
        "Encoded raster image"
    );

    Ok(buffer)
}

/// Composite onto white and drop alpha. JPEG has no transparency channel.
fn flatten_onto_white(pixels: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(pixels.width(), pixels.height(), |x, y| {
        let [r, g, b, a] = pixels.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Snap RGB channels to a reduced number of levels. Alpha is untouched.
fn quantize_rgb(pixels: &mut RgbaImage, quality: f32) {
    let levels = webp_levels(quality);
    let step = 255.0 / (levels - 1.0);
    for pixel in pixels.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

// Finer palettes at high quality, coarse ones near zero
fn webp_levels(quality: f32) -> f32 {
    (2.0 + quality * quality * 254.0).round().clamp(2.0, 256.0)
}
