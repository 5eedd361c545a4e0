//! PDF output and PDF input.
//!
//! This module handles both directions:
//! - Assembling pipeline output into PDF documents (one JPEG per page)
//! - Rasterizing PDF pages with PDFium so they can be re-encoded

pub mod rasterize;
pub mod writer;

use pdfium_render::prelude::*;

use crate::error::{ConversionError, ConversionResult};

pub use rasterize::{PageRenderer, PdfiumPages, rasterize_pages, rasterize_pdf_bytes};
pub use writer::{MM_PER_PX, PageLayout, PageOrientation, PdfPage, build_document};

/// Default render scale for PDF pages (2x the page's point size).
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> ConversionResult<Pdfium> {
    // Try local paths first, then system
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ConversionError::PdfiumUnavailable {
            message: format!("install libpdfium or place it in vendor/pdfium/lib: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}
