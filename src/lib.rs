//! cadforge: DXF drawing to instruction-tuning dataset pipeline.
//!
//! Converts one large CAD drawing into many (natural-language description,
//! regenerated DXF code) training pairs: extract entities, partition them
//! into chunks, describe each chunk with a local LLM, rebuild a minimal
//! DXF document per chunk, and stream validated JSONL records with
//! run-level statistics.

pub mod config;
pub mod dataset;
pub mod dxf;
pub mod labelling;
pub mod models;
pub mod pipeline;

pub use config::RunConfig;
pub use pipeline::{Orchestrator, PipelineError, RunReport};
