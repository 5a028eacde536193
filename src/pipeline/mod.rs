//! Pipeline orchestration and the run-level error taxonomy.
//!
//! Failures split two ways. Chunk-local errors (labelling, regeneration)
//! are caught at the chunk-task boundary, counted, logged with their chunk
//! id, and the run continues. Fatal errors (unreadable source, invalid
//! configuration, dataset I/O) cancel dispatch, drain in-flight work, and
//! abort the run with statistics intact.

pub mod orchestrator;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::dxf::ExtractionError;
use crate::labelling::LabellingError;

pub use orchestrator::{CancelToken, Orchestrator, RunOutcome, RunReport, Stage};

/// Fatal, run-aborting failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no entities found in {0}")]
    EmptyDrawing(PathBuf),

    #[error("failed to reach label service: {0}")]
    LabelService(LabellingError),

    #[error("label model {0:?} is not available on the service")]
    ModelUnavailable(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("worker task failed: {0}")]
    Worker(String),
}
