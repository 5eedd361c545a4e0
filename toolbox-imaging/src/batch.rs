//! Batch conversion with per-file status reporting.
//!
//! Files convert concurrently up to a limit. A failing file is recorded and
//! the rest of the batch keeps going.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::convert::{PdfMode, convert_pdf_to_images, convert_to_format, convert_to_pdf};
use crate::error::ConversionResult;
use crate::format::{DEFAULT_QUALITY, EncodedOutput, InputFile, OutputFormat};
use crate::pipeline::PipelineOptions;

/// Conversion status for one file in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Queued, not started yet
    Pending,
    /// Currently converting
    Converting,
    /// Converted successfully
    Success,
    /// Conversion failed
    Error,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Converting => "converting",
            ConversionStatus::Success => "success",
            ConversionStatus::Error => "error",
        }
    }
}

/// Status change for one file, sent as it happens.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub index: usize,
    pub name: String,
    pub status: ConversionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub format: OutputFormat,
    pub quality: f32,
    pub options: PipelineOptions,
    /// Render scale for PDF inputs rasterized to images.
    pub render_scale: Option<f32>,
    pub max_concurrency: usize,
}

impl BatchRequest {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_QUALITY,
            options: PipelineOptions::default(),
            render_scale: None,
            max_concurrency: default_concurrency(),
        }
    }
}

pub(crate) fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Outcome for one input, in upload order.
#[derive(Debug)]
pub struct BatchItem {
    pub index: usize,
    pub name: String,
    pub result: ConversionResult<Vec<EncodedOutput>>,
}

impl BatchItem {
    pub fn status(&self) -> ConversionStatus {
        if self.result.is_ok() {
            ConversionStatus::Success
        } else {
            ConversionStatus::Error
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: usize,
    pub fail: usize,
}

#[derive(Debug)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

impl BatchReport {
    /// All encoded outputs of successful items, in upload order.
    pub fn outputs(&self) -> impl Iterator<Item = &EncodedOutput> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref().ok())
            .flatten()
    }
}

fn notify(
    updates: Option<&UnboundedSender<StatusUpdate>>,
    index: usize,
    name: &str,
    status: ConversionStatus,
    error: Option<String>,
) {
    if let Some(tx) = updates {
        // A dropped receiver just means nobody is listening
        let _ = tx.send(StatusUpdate {
            index,
            name: name.to_string(),
            status,
            error,
        });
    }
}

async fn convert_one(
    file: &InputFile,
    request: &BatchRequest,
) -> ConversionResult<Vec<EncodedOutput>> {
    match request.format {
        OutputFormat::Pdf => {
            convert_to_pdf(
                std::slice::from_ref(file),
                request.quality,
                &request.options,
                PdfMode::Separate,
            )
            .await
        }
        format if file.is_pdf() => {
            convert_pdf_to_images(file, format, request.quality, request.render_scale).await
        }
        format => Ok(vec![
            convert_to_format(file, format, request.quality, &request.options).await?,
        ]),
    }
}

/// Rename outputs whose file name is already taken by an earlier output,
/// `photo.webp` then `photo_2.webp`, `photo_3.webp` and so on.
fn assign_unique_names(items: &mut [BatchItem]) {
    let mut taken = HashSet::new();
    let outputs = items
        .iter_mut()
        .filter_map(|item| item.result.as_mut().ok())
        .flatten();

    for output in outputs {
        if taken.insert(output.file_name.clone()) {
            continue;
        }
        let (stem, extension) = match output.file_name.rsplit_once('.') {
            Some((stem, extension)) => (stem.to_string(), format!(".{}", extension)),
            None => (output.file_name.clone(), String::new()),
        };
        let unique = (2usize..)
            .map(|n| format!("{}_{}{}", stem, n, extension))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_default();
        debug!(from = %output.file_name, to = %unique, "Renamed duplicate output");
        taken.insert(unique.clone());
        output.file_name = unique;
    }
}

/// Convert every file to `request.format`.
///
/// Status updates may arrive out of order; the report is ordered by index.
/// Output file names are unique within the report.
pub async fn convert_batch(
    files: Vec<InputFile>,
    request: &BatchRequest,
    updates: Option<UnboundedSender<StatusUpdate>>,
) -> BatchReport {
    let updates = updates.as_ref();
    for (index, file) in files.iter().enumerate() {
        notify(updates, index, &file.name, ConversionStatus::Pending, None);
    }

    let limit = request.max_concurrency.max(1);
    let mut items: Vec<BatchItem> = stream::iter(files.into_iter().enumerate())
        .map(|(index, file)| async move {
            notify(updates, index, &file.name, ConversionStatus::Converting, None);
            let result = convert_one(&file, request).await;
            match &result {
                Ok(outputs) => {
                    notify(updates, index, &file.name, ConversionStatus::Success, None);
                    info!(
                        file = %file.name,
                        outputs = outputs.len(),
                        "Batch item converted"
                    );
                }
                Err(e) => {
                    notify(
                        updates,
                        index,
                        &file.name,
                        ConversionStatus::Error,
                        Some(e.detailed_message()),
                    );
                    warn!(
                        file = %file.name,
                        error = %e.detailed_message(),
                        code = e.error_code(),
                        "Batch item failed"
                    );
                }
            }
            BatchItem {
                index,
                name: file.name,
                result,
            }
        })
        .buffered(limit)
        .collect()
        .await;

    assign_unique_names(&mut items);

    let success = items.iter().filter(|item| item.result.is_ok()).count();
    let summary = BatchSummary {
        success,
        fail: items.len() - success,
    };

    info!(
        format = %request.format,
        success = summary.success,
        fail = summary.fail,
        "Batch conversion finished"
    );

    BatchReport { items, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tokio::sync::mpsc;

    fn png_file(name: &str) -> InputFile {
        let mut data = Vec::new();
        RgbaImage::from_pixel(16, 12, Rgba([10, 200, 30, 255]))
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        InputFile::new(name, data)
    }

    #[tokio::test]
    async fn test_one_corrupt_file_does_not_stop_batch() {
        let files = vec![
            png_file("first.png"),
            InputFile::new("corrupt.jpg", b"\xFF\xD8 truncated".to_vec()),
            png_file("third.png"),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = convert_batch(files, &BatchRequest::new(OutputFormat::Png), Some(tx)).await;

        assert_eq!(
            report.summary,
            BatchSummary {
                success: 2,
                fail: 1
            }
        );
        let indexes: Vec<_> = report.items.iter().map(|i| i.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(report.items[1].status(), ConversionStatus::Error);
        let names: Vec<_> = report.outputs().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec!["first.png", "third.png"]);

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        // pending + converting + final for each file
        assert_eq!(updates.len(), 9);
        let failed = updates
            .iter()
            .find(|u| u.status == ConversionStatus::Error)
            .unwrap();
        assert_eq!(failed.index, 1);
        assert!(failed.error.as_deref().unwrap().contains("corrupt.jpg"));
    }

    #[tokio::test]
    async fn test_pdf_batch_is_one_document_per_file() {
        let files = vec![png_file("a.png"), png_file("b.png")];
        let mut request = BatchRequest::new(OutputFormat::Pdf);
        request.max_concurrency = 1;
        let report = convert_batch(files, &request, None).await;
        assert_eq!(report.summary.success, 2);
        let names: Vec<_> = report.outputs().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_same_stem_inputs_get_distinct_names() {
        let mut jpeg = Vec::new();
        RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]))
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let files = vec![
            png_file("photo.png"),
            InputFile::new("photo.jpg", jpeg),
            png_file("photo_2.png"),
            png_file("other.png"),
        ];
        let report = convert_batch(files, &BatchRequest::new(OutputFormat::Webp), None).await;
        assert_eq!(report.summary.success, 4);
        let names: Vec<_> = report.outputs().map(|o| o.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["photo.webp", "photo_2.webp", "photo_2_2.webp", "other.webp"]
        );
    }

    #[test]
    fn test_unique_names_skip_failed_items() {
        let output = |name: &str| EncodedOutput {
            file_name: name.to_string(),
            format: OutputFormat::Png,
            data: bytes::Bytes::new(),
            dimensions: None,
        };
        let mut items = vec![
            BatchItem {
                index: 0,
                name: "a.png".into(),
                result: Ok(vec![output("a_page_1.png"), output("a_page_2.png")]),
            },
            BatchItem {
                index: 1,
                name: "broken.png".into(),
                result: Err(crate::error::ConversionError::EmptyInput),
            },
            BatchItem {
                index: 2,
                name: "a.png".into(),
                result: Ok(vec![output("a_page_1.png")]),
            },
        ];
        assign_unique_names(&mut items);
        let names: Vec<_> = items
            .iter()
            .filter_map(|item| item.result.as_ref().ok())
            .flatten()
            .map(|o| o.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["a_page_1.png", "a_page_2.png", "a_page_1_2.png"]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = convert_batch(vec![], &BatchRequest::new(OutputFormat::Png), None).await;
        assert!(report.items.is_empty());
        assert_eq!(report.summary, BatchSummary::default());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ConversionStatus::Converting.as_str(), "converting");
        assert_eq!(
            serde_json::to_string(&ConversionStatus::Success).unwrap(),
            r#""success""#
        );
    }
}
