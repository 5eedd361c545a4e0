//! Public conversion operations.
//!
//! Each operation decodes, runs the pipeline and encodes. CPU-bound work
//! runs on tokio's blocking pool.

use std::io::Cursor;

use bytes::Bytes;
use image::ImageReader;
use serde::Deserialize;
use tracing::{debug, info};

use crate::encode::encode_raster;
use crate::error::{ConversionError, ConversionResult};
use crate::format::{EncodedOutput, ImageDimensions, InputFile, OutputFormat, derive_file_name};
use crate::pdf::{self, DEFAULT_RENDER_SCALE, PdfPage};
use crate::pipeline::{self, PipelineOptions};
use crate::raster::{Background, RasterImage};

/// How multiple images are grouped into PDF documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfMode {
    /// One document, one page per image.
    #[default]
    Single,
    /// One single-page document per image.
    Separate,
}

/// File name used for a multi-image single-document PDF.
const COMBINED_PDF_STEM: &str = "combined";

/// Decode a JPEG or PNG source into an RGBA canvas. Blocking.
pub fn decode_file(file: &InputFile) -> ConversionResult<RasterImage> {
    let decoded = image::load_from_memory(&file.data).map_err(|source| ConversionError::Decode {
        name: file.name.clone(),
        source,
    })?;
    debug!(
        file = %file.name,
        size = format!("{}x{}", decoded.width(), decoded.height()),
        "Decoded source image"
    );
    RasterImage::from_rgba(&file.name, decoded.to_rgba8())
}

/// Canvas fill for exposed areas, given the target format.
fn background_for(format: OutputFormat) -> Background {
    if format.keeps_transparency() {
        Background::Transparent
    } else {
        Background::white()
    }
}

/// Decode and run the pipeline for one file.
async fn render(
    file: &InputFile,
    options: &PipelineOptions,
    background: Background,
) -> ConversionResult<RasterImage> {
    let source = {
        let file = file.clone();
        tokio::task::spawn_blocking(move || decode_file(&file)).await??
    };
    pipeline::process(source, options, background).await
}

/// Convert one image to JPEG, PNG or WEBP.
pub async fn convert_to_format(
    file: &InputFile,
    format: OutputFormat,
    quality: f32,
    options: &PipelineOptions,
) -> ConversionResult<EncodedOutput> {
    if !format.is_raster() {
        return Err(ConversionError::UnsupportedFormat { format });
    }

    let canvas = render(file, options, background_for(format)).await?;
    let dimensions = canvas.dimensions();
    let data =
        tokio::task::spawn_blocking(move || encode_raster(&canvas, format, quality)).await??;

    info!(
        file = %file.name,
        format = %format,
        size = format!("{}x{}", dimensions.width, dimensions.height),
        bytes = data.len(),
        "Converted image"
    );

    Ok(EncodedOutput {
        file_name: derive_file_name(file.stem(), format),
        format,
        data: Bytes::from(data),
        dimensions: Some(dimensions),
    })
}

pub async fn convert_to_jpeg(
    file: &InputFile,
    quality: f32,
    options: &PipelineOptions,
) -> ConversionResult<EncodedOutput> {
    convert_to_format(file, OutputFormat::Jpeg, quality, options).await
}

pub async fn convert_to_png(
    file: &InputFile,
    options: &PipelineOptions,
) -> ConversionResult<EncodedOutput> {
    convert_to_format(file, OutputFormat::Png, 1.0, options).await
}

pub async fn convert_to_webp(
    file: &InputFile,
    quality: f32,
    options: &PipelineOptions,
) -> ConversionResult<EncodedOutput> {
    convert_to_format(file, OutputFormat::Webp, quality, options).await
}

/// Run the full pipeline for one image and encode it as a JPEG page.
async fn render_page(
    file: &InputFile,
    quality: f32,
    options: &PipelineOptions,
) -> ConversionResult<PdfPage> {
    let canvas = render(file, options, background_for(OutputFormat::Pdf)).await?;
    let (width, height) = (canvas.width(), canvas.height());
    let jpeg = tokio::task::spawn_blocking(move || {
        encode_raster(&canvas, OutputFormat::Jpeg, quality)
    })
    .await??;
    Ok(PdfPage {
        jpeg,
        width,
        height,
    })
}

async fn assemble(stem: &str, pages: Vec<PdfPage>) -> ConversionResult<EncodedOutput> {
    let page_count = pages.len();
    let data = tokio::task::spawn_blocking(move || pdf::build_document(&pages)).await??;
    debug!(stem = stem, pages = page_count, "Assembled PDF document");
    Ok(EncodedOutput {
        file_name: derive_file_name(stem, OutputFormat::Pdf),
        format: OutputFormat::Pdf,
        data: Bytes::from(data),
        dimensions: None,
    })
}

/// Convert images into PDF documents, one page per image.
///
/// Every image goes through the whole pipeline first. `Single` returns one
/// document; `Separate` returns one document per image in input order.
pub async fn convert_to_pdf(
    files: &[InputFile],
    quality: f32,
    options: &PipelineOptions,
    mode: PdfMode,
) -> ConversionResult<Vec<EncodedOutput>> {
    if files.is_empty() {
        return Err(ConversionError::EmptyInput);
    }

    let outputs = match mode {
        PdfMode::Single => {
            let mut pages = Vec::with_capacity(files.len());
            for file in files {
                pages.push(render_page(file, quality, options).await?);
            }
            let stem = match files {
                [only] => only.stem(),
                _ => COMBINED_PDF_STEM,
            };
            vec![assemble(stem, pages).await?]
        }
        PdfMode::Separate => {
            let mut outputs = Vec::with_capacity(files.len());
            for file in files {
                let page = render_page(file, quality, options).await?;
                outputs.push(assemble(file.stem(), vec![page]).await?);
            }
            outputs
        }
    };

    info!(
        files = files.len(),
        documents = outputs.len(),
        mode = ?mode,
        "Converted images to PDF"
    );

    Ok(outputs)
}

/// Rasterize every page of a PDF, in page order.
///
/// `scale` defaults to 2x the page's point size.
pub async fn convert_pdf_to_images(
    file: &InputFile,
    format: OutputFormat,
    quality: f32,
    scale: Option<f32>,
) -> ConversionResult<Vec<EncodedOutput>> {
    let scale = scale
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(DEFAULT_RENDER_SCALE);
    let file = file.clone();

    tokio::task::spawn_blocking(move || {
        pdf::rasterize_pdf_bytes(&file.name, file.stem(), &file.data, format, quality, scale)
    })
    .await?
}

/// Read pixel dimensions from the image header without decoding pixels.
pub fn get_image_dimensions(file: &InputFile) -> ConversionResult<ImageDimensions> {
    let decode_error = |source| ConversionError::Decode {
        name: file.name.clone(),
        source,
    };
    let (width, height) = ImageReader::new(Cursor::new(&file.data[..]))
        .with_guessed_format()
        .map_err(|source| ConversionError::Read {
            name: file.name.clone(),
            source,
        })?
        .into_dimensions()
        .map_err(decode_error)?;
    Ok(ImageDimensions { width, height })
}
