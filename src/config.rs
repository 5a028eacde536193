//! Run configuration and startup validation.
//!
//! Every option is checked before any extraction happens; an invalid
//! configuration aborts the run without touching the input or the output
//! path.

use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_CHUNK_SIZE: usize = 7;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MIN_LABEL_LENGTH: usize = 10;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,
    #[error("max_chunks must be at least 1 when set")]
    InvalidMaxChunks,
    #[error("temperature must be between 0.0 and 1.0, got {0}")]
    InvalidTemperature(f32),
    #[error("min_label_length must be at least 1")]
    InvalidMinLabelLength,
    #[error("workers must be at least 1")]
    InvalidWorkers,
    #[error("timeout_secs must be at least 1")]
    InvalidTimeout,
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),
    #[error("input must be a .dxf file: {0}")]
    InputNotDxf(PathBuf),
    #[error("label service URL must start with http:// or https://, got {0:?}")]
    InvalidServiceUrl(String),
}

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source DXF drawing.
    pub input: PathBuf,
    /// Output JSONL dataset path.
    pub output: PathBuf,
    /// Label model identifier.
    pub model: String,
    /// Entities per chunk.
    pub chunk_size: usize,
    /// Process only the first N chunks; `None` = all of them.
    pub max_chunks: Option<usize>,
    /// Sampling temperature for label generation.
    pub temperature: f32,
    /// Minimum accepted label length, in characters.
    pub min_label_length: usize,
    /// Bound on concurrently processed chunks.
    pub workers: usize,
    /// Base URL of the label service.
    pub ollama_url: String,
    /// Per-request timeout for label calls, in seconds.
    pub timeout_secs: u64,
}

impl RunConfig {
    /// Config with the given paths and every other option at its default.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            model: DEFAULT_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: None,
            temperature: DEFAULT_TEMPERATURE,
            min_label_length: DEFAULT_MIN_LABEL_LENGTH,
            workers: DEFAULT_WORKERS,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 1 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.max_chunks == Some(0) {
            return Err(ConfigError::InvalidMaxChunks);
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.min_label_length < 1 {
            return Err(ConfigError::InvalidMinLabelLength);
        }
        if self.workers < 1 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.timeout_secs < 1 {
            return Err(ConfigError::InvalidTimeout);
        }
        if !self.ollama_url.starts_with("http://") && !self.ollama_url.starts_with("https://") {
            return Err(ConfigError::InvalidServiceUrl(self.ollama_url.clone()));
        }
        let is_dxf = self
            .input
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dxf"));
        if !is_dxf {
            return Err(ConfigError::InputNotDxf(self.input.clone()));
        }
        if !self.input.exists() {
            return Err(ConfigError::InputNotFound(self.input.clone()));
        }
        Ok(())
    }
}
