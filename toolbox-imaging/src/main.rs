use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use toolbox_imaging::config::JobConfig;
use toolbox_imaging::{
    BatchRequest, ConversionError, ConversionStatus, EncodedOutput, InputFile, OutputFormat,
    PdfMode, StatusUpdate, convert_batch, convert_to_pdf,
};

/// Printed to stdout when the job finishes.
#[derive(Debug, Serialize)]
struct JobSummary {
    success: usize,
    fail: usize,
    outputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting toolbox-imaging v{}", env!("CARGO_PKG_VERSION"));

    // Optional config file path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let job = JobConfig::load(config_path.as_deref())?;

    info!(
        inputs = job.inputs.len(),
        format = %job.format,
        quality = job.quality,
        output_dir = %job.output_dir.display(),
        "Job configuration loaded"
    );

    if job.inputs.is_empty() {
        return Err(ConversionError::EmptyInput.into());
    }

    tokio::fs::create_dir_all(&job.output_dir).await?;

    // Unreadable inputs count as failures but do not stop the job
    let mut files = Vec::with_capacity(job.inputs.len());
    let mut unreadable = 0;
    for path in &job.inputs {
        match InputFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e.detailed_message(), "Skipping input");
                unreadable += 1;
            }
        }
    }

    let mut summary = if job.format == OutputFormat::Pdf && job.pdf_mode == PdfMode::Single {
        run_single_pdf(&job, files).await?
    } else {
        run_batch(&job, files).await?
    };
    summary.fail += unreadable;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Merge every input into one PDF document. Any failure fails the job.
async fn run_single_pdf(
    job: &JobConfig,
    files: Vec<InputFile>,
) -> Result<JobSummary, Box<dyn std::error::Error>> {
    let count = files.len();
    let documents = convert_to_pdf(&files, job.quality, &job.pipeline, PdfMode::Single).await?;
    let outputs = write_outputs(&job.output_dir, &documents).await?;
    Ok(JobSummary {
        success: count,
        fail: 0,
        outputs,
    })
}

async fn run_batch(
    job: &JobConfig,
    files: Vec<InputFile>,
) -> Result<JobSummary, Box<dyn std::error::Error>> {
    let request = BatchRequest {
        format: job.format,
        quality: job.quality,
        options: job.pipeline.clone(),
        render_scale: Some(job.render_scale),
        max_concurrency: job.concurrency,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<StatusUpdate>();
    let listener = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update.status {
                ConversionStatus::Error => warn!(
                    index = update.index,
                    file = %update.name,
                    error = update.error.as_deref().unwrap_or_default(),
                    "Conversion failed"
                ),
                status => debug!(
                    index = update.index,
                    file = %update.name,
                    status = status.as_str(),
                    "Conversion status"
                ),
            }
        }
    });

    let report = convert_batch(files, &request, Some(tx)).await;
    listener.await?;

    let produced: Vec<EncodedOutput> = report.outputs().cloned().collect();
    let outputs = write_outputs(&job.output_dir, &produced).await?;

    Ok(JobSummary {
        success: report.summary.success,
        fail: report.summary.fail,
        outputs,
    })
}

async fn write_outputs(
    dir: &Path,
    outputs: &[EncodedOutput],
) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = dir.join(&output.file_name);
        tokio::fs::write(&path, &output.data).await?;
        info!(path = %path.display(), bytes = output.data.len(), mime = %output.mime(), "Wrote output");
        written.push(path);
    }
    Ok(written)
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolbox_imaging=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
