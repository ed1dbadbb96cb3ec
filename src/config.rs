use std::path::PathBuf;

use clap::{Args, ValueEnum};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// How an uploaded image is fitted to the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ResizeMode {
    /// Resize to exactly the input size, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Keep aspect ratio and pad with black.
    Letterbox,
}

/// Pixel scaling applied before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Normalization {
    /// 0..=255, for models that rescale internally.
    #[default]
    Raw,
    /// 0..=1
    Unit,
    /// ImageNet mean/std on the 0..=1 range.
    Imagenet,
}

#[derive(Debug, Clone, Args)]
pub struct ModelConfig {
    /// Path to the ONNX model
    #[arg(
        long = "model",
        env = "CAT_OR_LOAF_MODEL",
        default_value = "static/models/cat_or_loaf.onnx",
        global = true
    )]
    pub model_path: PathBuf,

    /// Square input size, used when the model does not pin its spatial dims
    #[arg(long, env = "CAT_OR_LOAF_INPUT_SIZE", global = true)]
    pub input_size: Option<u32>,

    #[arg(
        long,
        value_enum,
        env = "CAT_OR_LOAF_RESIZE",
        default_value_t = ResizeMode::Stretch,
        global = true
    )]
    pub resize: ResizeMode,

    #[arg(
        long,
        value_enum,
        env = "CAT_OR_LOAF_NORMALIZATION",
        default_value_t = Normalization::Raw,
        global = true
    )]
    pub normalization: Normalization,
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Server bind address
    #[arg(long, env = "CAT_OR_LOAF_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Number of worker threads
    #[arg(long, env = "CAT_OR_LOAF_WORKERS")]
    pub workers: Option<usize>,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "CAT_OR_LOAF_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Directory for temporary upload copies; the system temp dir if unset
    #[arg(long, env = "CAT_OR_LOAF_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Origins allowed by CORS; `*` allows any
    #[arg(
        long = "allowed-origin",
        env = "CAT_OR_LOAF_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,
}

/// Per-request upload limits, shared with the handlers as app data.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub dir: Option<PathBuf>,
}

impl From<&ServerConfig> for UploadConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            dir: config.upload_dir.clone(),
        }
    }
}
