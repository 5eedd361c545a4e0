use thiserror::Error;

use crate::format::OutputFormat;

/// Main conversion error type
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to read {name}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {name}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Decoded image {name} has no pixels")]
    EmptyImage { name: String },

    #[error("Failed to encode {format}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },

    #[error("Unsupported output format for this operation: {format}")]
    UnsupportedFormat { format: OutputFormat },

    #[error("No input files given")]
    EmptyInput,

    #[error("Failed to assemble PDF document: {message}")]
    PdfWrite { message: String },

    #[error("Failed to load PDF {name}")]
    PdfLoad {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to render PDF page {page}")]
    PageRender {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("PDFium library unavailable: {message}")]
    PdfiumUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Conversion task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl ConversionError {
    /// Stable identifier for status badges and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConversionError::Read { .. } => "read_error",
            ConversionError::Decode { .. } => "decode_error",
            ConversionError::EmptyImage { .. } => "empty_image",
            ConversionError::Encode { .. } => "encode_error",
            ConversionError::UnsupportedFormat { .. } => "unsupported_format",
            ConversionError::EmptyInput => "empty_input",
            ConversionError::PdfWrite { .. } => "pdf_write_error",
            ConversionError::PdfLoad { .. } => "pdf_load_error",
            ConversionError::PageRender { .. } => "page_render_error",
            ConversionError::PdfiumUnavailable { .. } => "pdfium_unavailable",
            ConversionError::Config { .. } => "config_error",
            ConversionError::Task(_) => "task_error",
        }
    }

    /// Message including the first underlying cause, for single-line reports.
    pub fn detailed_message(&self) -> String {
        match std::error::Error::source(self) {
            Some(source) => format!("{}: {}", self, source),
            None => self.to_string(),
        }
    }
}

/// Result type alias for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;
