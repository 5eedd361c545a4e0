//! Render PDF pages to raster images and re-encode them.

use bytes::Bytes;
use image::RgbaImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::encode::encode_raster;
use crate::error::{ConversionError, ConversionResult};
use crate::format::{EncodedOutput, OutputFormat};
use crate::raster::RasterImage;

type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// Something that can draw the pages of a loaded document.
pub trait PageRenderer {
    fn page_count(&self) -> usize;

    /// Render a 0-indexed page at `scale` times its point size.
    fn render_page(&self, index: usize, scale: f32) -> Result<RgbaImage, RenderError>;
}

/// A PDFium document viewed as a [`PageRenderer`].
pub struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumPages<'a> {
    pub fn new(document: PdfDocument<'a>) -> Self {
        Self { document }
    }
}

impl PageRenderer for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        // PDFium page counts and indexes are u16
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<RgbaImage, RenderError> {
        // index < page_count(), which came from a u16, so the cast is lossless
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| std::io::Error::other(format!("Failed to get page: {}", e)))?;

        let width_px = (page.width().value * scale).ceil().max(1.0) as i32;
        let height_px = (page.height().value * scale).ceil().max(1.0) as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| std::io::Error::other(format!("Failed to render page: {}", e)))?;

        Ok(bitmap.as_image().to_rgba8())
    }
}

/// Render every page in order and encode each as `format`.
///
/// The first failing page aborts the whole operation; the error names it
/// with a 1-based page number.
pub fn rasterize_pages(
    renderer: &impl PageRenderer,
    stem: &str,
    format: OutputFormat,
    quality: f32,
    scale: f32,
) -> ConversionResult<Vec<EncodedOutput>> {
    if !format.is_raster() {
        return Err(ConversionError::UnsupportedFormat { format });
    }

    let page_count = renderer.page_count();
    let mut outputs = Vec::with_capacity(page_count);

    for index in 0..page_count {
        let page = index + 1;
        let page_error = |source: RenderError| ConversionError::PageRender { page, source };

        let pixels = renderer.render_page(index, scale).map_err(page_error)?;
        let raster = RasterImage::from_rgba(&format!("{} page {}", stem, page), pixels)
            .map_err(|e| page_error(Box::new(e)))?;
        let data = encode_raster(&raster, format, quality).map_err(|e| page_error(Box::new(e)))?;

        debug!(
            page = page,
            size = format!("{}x{}", raster.width(), raster.height()),
            "Rendered PDF page"
        );

        outputs.push(EncodedOutput {
            file_name: format!("{}_page_{}.{}", stem, page, format.extension()),
            format,
            data: Bytes::from(data),
            dimensions: Some(raster.dimensions()),
        });
    }

    info!(
        pages = outputs.len(),
        format = %format,
        scale = scale,
        "Rasterized PDF"
    );

    Ok(outputs)
}

/// Load a PDF from memory with PDFium and rasterize all of its pages.
///
/// Blocking; run it on a blocking thread.
pub fn rasterize_pdf_bytes(
    name: &str,
    stem: &str,
    data: &[u8],
    format: OutputFormat,
    quality: f32,
    scale: f32,
) -> ConversionResult<Vec<EncodedOutput>> {
    let pdfium = super::create_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| ConversionError::PdfLoad {
                name: name.to_string(),
                source: Box::new(std::io::Error::other(e.to_string())),
            })?;

    rasterize_pages(&PdfiumPages::new(document), stem, format, quality, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::{PdfPage, build_document};
    use image::Rgba;

    /// Renders solid pages whose red channel encodes the page index.
    struct FakeRenderer {
        pages: usize,
        fail_at: Option<usize>,
    }

    impl PageRenderer for FakeRenderer {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<RgbaImage, RenderError> {
            if self.fail_at == Some(index) {
                return Err("corrupt content stream".into());
            }
            let size = (10.0 * scale) as u32;
            Ok(RgbaImage::from_pixel(
                size,
                size,
                Rgba([index as u8 * 50, 0, 0, 255]),
            ))
        }
    }

    #[test]
    fn test_pages_come_out_in_order() {
        let renderer = FakeRenderer {
            pages: 3,
            fail_at: None,
        };
        let outputs = rasterize_pages(&renderer, "report", OutputFormat::Png, 1.0, 2.0).unwrap();
        assert_eq!(outputs.len(), 3);
        let names: Vec<_> = outputs.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["report_page_1.png", "report_page_2.png", "report_page_3.png"]
        );
        for (index, output) in outputs.iter().enumerate() {
            let decoded = image::load_from_memory(&output.data).unwrap().to_rgba8();
            assert_eq!(decoded.dimensions(), (20, 20));
            assert_eq!(decoded.get_pixel(0, 0).0[0], index as u8 * 50);
        }
    }

    #[test]
    fn test_failing_page_aborts_with_page_number() {
        let renderer = FakeRenderer {
            pages: 4,
            fail_at: Some(2),
        };
        let err = rasterize_pages(&renderer, "scan", OutputFormat::Jpeg, 0.8, 1.0).unwrap_err();
        match &err {
            ConversionError::PageRender { page, .. } => assert_eq!(*page, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.to_string(), "Failed to render PDF page 3");
    }

    #[test]
    fn test_pdf_target_rejected() {
        let renderer = FakeRenderer {
            pages: 1,
            fail_at: None,
        };
        assert!(matches!(
            rasterize_pages(&renderer, "x", OutputFormat::Pdf, 1.0, 1.0),
            Err(ConversionError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_pdfium_renders_every_page() {
        // Needs the native library
        if super::super::create_pdfium().is_err() {
            return;
        }

        let page = |w: u32, h: u32| {
            let image = RasterImage(RgbaImage::from_pixel(w, h, Rgba([0, 120, 255, 255])));
            PdfPage {
                jpeg: encode_raster(&image, OutputFormat::Jpeg, 0.9).unwrap(),
                width: w,
                height: h,
            }
        };
        let pdf = build_document(&[page(80, 60), page(60, 80)]).unwrap();

        let outputs =
            rasterize_pdf_bytes("doc.pdf", "doc", &pdf, OutputFormat::Png, 1.0, 2.0).unwrap();
        assert_eq!(outputs.len(), 2);
        let first = outputs[0].dimensions.unwrap();
        let second = outputs[1].dimensions.unwrap();
        assert!(first.width > first.height);
        assert!(second.height > second.width);
    }
}
