//! Assemble JPEG-encoded pages into a PDF document.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use tracing::debug;

use crate::error::{ConversionError, ConversionResult};

/// Millimetres per CSS pixel (96 dpi).
pub const MM_PER_PX: f64 = 0.264583;

const POINTS_PER_MM: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
}

/// Physical size of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width_mm: f64,
    pub height_mm: f64,
    pub orientation: PageOrientation,
}

impl PageLayout {
    /// Page sized to the image at 96 dpi. Landscape only when strictly wider.
    pub fn for_pixels(width: u32, height: u32) -> Self {
        let width_mm = f64::from(width) * MM_PER_PX;
        let height_mm = f64::from(height) * MM_PER_PX;
        let orientation = if width_mm > height_mm {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        };
        Self {
            width_mm,
            height_mm,
            orientation,
        }
    }

    pub fn width_pt(&self) -> f64 {
        self.width_mm * POINTS_PER_MM
    }

    pub fn height_pt(&self) -> f64 {
        self.height_mm * POINTS_PER_MM
    }
}

/// One page worth of image: baseline JPEG data plus its pixel size.
#[derive(Debug, Clone)]
pub struct PdfPage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PdfPage {
    pub fn layout(&self) -> PageLayout {
        PageLayout::for_pixels(self.width, self.height)
    }
}

fn write_error(e: impl std::fmt::Display) -> ConversionError {
    ConversionError::PdfWrite {
        message: e.to_string(),
    }
}

/// Build a document with one page per entry, each image filling its page.
pub fn build_document(pages: &[PdfPage]) -> ConversionResult<Vec<u8>> {
    if pages.is_empty() {
        return Err(ConversionError::EmptyInput);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let layout = page.layout();
        let (width_pt, height_pt) = (layout.width_pt() as f32, layout.height_pt() as f32);

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(page.width),
                "Height" => i64::from(page.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg.clone(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(write_error)?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
        });
        kids.push(page_id.into());

        debug!(
            size_px = format!("{}x{}", page.width, page.height),
            size_mm = format!("{:.2}x{:.2}", layout.width_mm, layout.height_mm),
            orientation = ?layout.orientation,
            "Added PDF page"
        );
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(write_error)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_raster;
    use crate::format::OutputFormat;
    use crate::raster::RasterImage;
    use image::{Rgba, RgbaImage};

    fn jpeg_page(width: u32, height: u32) -> PdfPage {
        let image = RasterImage(RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255])));
        PdfPage {
            jpeg: encode_raster(&image, OutputFormat::Jpeg, 0.9).unwrap(),
            width,
            height,
        }
    }

    fn number(object: &Object) -> f64 {
        match object {
            Object::Integer(v) => *v as f64,
            Object::Real(v) => f64::from(*v),
            other => panic!("not a number: {:?}", other),
        }
    }

    #[test]
    fn test_layout_matches_pixel_size() {
        let layout = PageLayout::for_pixels(800, 600);
        assert!((layout.width_mm - 211.6664).abs() < 0.01);
        assert!((layout.height_mm - 158.7498).abs() < 0.01);
        assert_eq!(layout.orientation, PageOrientation::Landscape);
        assert!((layout.width_pt() - 600.0).abs() < 0.01);

        assert_eq!(
            PageLayout::for_pixels(600, 800).orientation,
            PageOrientation::Portrait
        );
        assert_eq!(
            PageLayout::for_pixels(500, 500).orientation,
            PageOrientation::Portrait
        );
    }

    #[test]
    fn test_two_pages_in_one_document() {
        let bytes = build_document(&[jpeg_page(800, 600), jpeg_page(800, 600)]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        for page_id in pages.values() {
            let page = doc.get_dictionary(*page_id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            let width = number(&media_box[2]);
            let height = number(&media_box[3]);
            assert!((width - 600.0).abs() < 0.1);
            assert!((height - 450.0).abs() < 0.1);
            assert!(width > height);
        }
    }

    #[test]
    fn test_mixed_page_sizes() {
        let bytes = build_document(&[jpeg_page(100, 300), jpeg_page(300, 100)]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        let first = doc.get_dictionary(pages[&1]).unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert!(number(&media_box[3]) > number(&media_box[2]));
    }

    #[test]
    fn test_empty_document_rejected() {
        let err = build_document(&[]).unwrap_err();
        assert_eq!(err.error_code(), "empty_input");
    }
}
