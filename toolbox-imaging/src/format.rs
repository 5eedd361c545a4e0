//! Output formats, input files and encoded results.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};

/// Quality used when a caller passes something that is not a finite number.
pub const DEFAULT_QUALITY: f32 = 0.92;

/// Target encoding for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime(self) -> Mime {
        match self {
            OutputFormat::Jpeg => mime::IMAGE_JPEG,
            OutputFormat::Png => mime::IMAGE_PNG,
            // `mime` has no WebP constant
            OutputFormat::Webp => "image/webp"
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
            OutputFormat::Pdf => mime::APPLICATION_PDF,
        }
    }

    /// Raster formats go through `encode_raster`; PDF is assembled separately.
    pub fn is_raster(self) -> bool {
        !matches!(self, OutputFormat::Pdf)
    }

    /// Whether the encoded result can carry transparency.
    ///
    /// Only PNG keeps exposed canvas areas transparent; every other target
    /// gets a white fill where crop or padding reveals empty space.
    pub fn keeps_transparency(self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::Webp => "WEBP",
            OutputFormat::Pdf => "PDF",
        };
        f.write_str(label)
    }
}

/// Clamp a 0..1 quality, falling back to the default for NaN/inf.
pub fn normalize_quality(quality: f32) -> f32 {
    if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        DEFAULT_QUALITY
    }
}

/// Map a 0..1 quality onto the 1..100 scale used by the JPEG encoder.
pub fn quality_percent(quality: f32) -> u8 {
    (normalize_quality(quality) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// A user-supplied file: a display name plus its raw bytes.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub data: Bytes,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, using its file name as the display name.
    pub async fn from_path(path: &Path) -> ConversionResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ConversionError::Read {
                name: name.clone(),
                source,
            })?;
        Ok(Self::new(name, data))
    }

    /// File name without its extension, falling back to "converted".
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("converted")
    }

    pub fn is_pdf(&self) -> bool {
        self.data.starts_with(b"%PDF")
            || Path::new(&self.name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }
}

/// Final binary blob produced by a conversion.
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    pub file_name: String,
    pub format: OutputFormat,
    pub data: Bytes,
    /// Pixel size for raster outputs; `None` for PDF documents.
    pub dimensions: Option<ImageDimensions>,
}

impl EncodedOutput {
    pub fn mime(&self) -> Mime {
        self.format.mime()
    }
}

/// Build a download name from a source stem and target format.
pub fn derive_file_name(stem: &str, format: OutputFormat) -> String {
    let safe_stem: String = stem
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
        .collect();
    format!("{}.{}", safe_stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_percent() {
        assert_eq!(quality_percent(0.9), 90);
        assert_eq!(quality_percent(1.0), 100);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(7.0), 100);
        assert_eq!(quality_percent(f32::NAN), 92);
    }

    #[test]
    fn test_transparency_per_format() {
        assert!(OutputFormat::Png.keeps_transparency());
        assert!(!OutputFormat::Jpeg.keeps_transparency());
        assert!(!OutputFormat::Webp.keeps_transparency());
        assert!(!OutputFormat::Pdf.keeps_transparency());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(OutputFormat::Jpeg.mime().essence_str(), "image/jpeg");
        assert_eq!(OutputFormat::Webp.mime().essence_str(), "image/webp");
        assert_eq!(OutputFormat::Pdf.mime().essence_str(), "application/pdf");
    }

    #[test]
    fn test_stem_and_file_name() {
        let file = InputFile::new("holiday/beach.photo.png", Vec::new());
        assert_eq!(file.stem(), "beach.photo");
        assert_eq!(derive_file_name(file.stem(), OutputFormat::Webp), "beach.photo.webp");

        let unnamed = InputFile::new("", Vec::new());
        assert_eq!(unnamed.stem(), "converted");
    }

    #[test]
    fn test_pdf_detection() {
        assert!(InputFile::new("scan.PDF", Vec::new()).is_pdf());
        assert!(InputFile::new("upload", b"%PDF-1.5\n".to_vec()).is_pdf());
        assert!(!InputFile::new("photo.jpg", vec![0xFF, 0xD8]).is_pdf());
    }

    #[test]
    fn test_format_deserializes_jpg_alias() {
        let format: OutputFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(format, OutputFormat::Jpeg);
        let format: OutputFormat = serde_json::from_str("\"webp\"").unwrap();
        assert_eq!(format, OutputFormat::Webp);
    }
}
