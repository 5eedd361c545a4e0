//! Image conversion toolbox.
//!
//! Decodes JPEG/PNG sources, runs them through an optional edit pipeline
//! (crop, resize/rotate/flip, color filters, padding, watermark) and encodes
//! the result as JPEG, PNG, WEBP or PDF. PDF inputs can be rasterized back
//! into images page by page.

pub mod batch;
pub mod config;
pub mod convert;
pub mod encode;
pub mod error;
pub mod format;
pub mod pdf;
pub mod pipeline;
pub mod raster;

pub use batch::{
    BatchItem, BatchReport, BatchRequest, BatchSummary, ConversionStatus, StatusUpdate,
    convert_batch,
};
pub use convert::{
    PdfMode, convert_pdf_to_images, convert_to_format, convert_to_jpeg, convert_to_pdf,
    convert_to_png, convert_to_webp, get_image_dimensions,
};
pub use error::{ConversionError, ConversionResult};
pub use format::{EncodedOutput, ImageDimensions, InputFile, OutputFormat};
pub use pipeline::PipelineOptions;
pub use raster::{Background, Color, RasterImage};
