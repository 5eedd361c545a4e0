//! Job configuration for the `toolbox-imaging` binary.
//!
//! Loaded from an optional `imaging.toml` (or a path given on the command
//! line), overridden by `IMAGING__*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::default_concurrency;
use crate::convert::PdfMode;
use crate::error::{ConversionError, ConversionResult};
use crate::format::{DEFAULT_QUALITY, OutputFormat};
use crate::pdf::DEFAULT_RENDER_SCALE;
use crate::pipeline::PipelineOptions;

/// One conversion job: what to read, how to edit it and where to write.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// 0..1, ignored for PNG
    #[serde(default = "default_quality")]
    pub quality: f32,

    #[serde(default)]
    pub pdf_mode: PdfMode,

    /// Scale for rasterizing PDF inputs
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub pipeline: PipelineOptions,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("converted")
}

fn default_format() -> OutputFormat {
    OutputFormat::Jpeg
}

fn default_quality() -> f32 {
    DEFAULT_QUALITY
}

fn default_render_scale() -> f32 {
    DEFAULT_RENDER_SCALE
}

impl JobConfig {
    /// Load from `path` when given (must exist), otherwise from an optional
    /// `imaging.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> ConversionResult<Self> {
        let file_source = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("imaging").required(false),
        };

        Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("IMAGING")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("inputs"),
            )
            .build()
            .and_then(|c| c.try_deserialize::<JobConfig>())
            .map_err(|e| ConversionError::Config {
                message: e.to_string(),
            })
    }
}
