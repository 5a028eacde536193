//! Pipeline orchestration.
//!
//! Drives the full run: extract → chunk → process (label ∥ regenerate →
//! assemble, per chunk, across a bounded worker pool) → finalize. Chunk
//! processing is embarrassingly parallel; the only shared state is the
//! append-only dataset writer and the atomic statistics. The blocking
//! label call runs on the blocking thread pool so it never stalls
//! regeneration work for other chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::PipelineError;
use crate::config::RunConfig;
use crate::dataset::{DatasetWriter, RunStatistics, StatsSnapshot, TrainingPair};
use crate::dxf::{regenerate_from_chunk, DxfExtractor};
use crate::labelling::{LabelGenerator, LlmClient};
use crate::models::{chunk_entities, Chunk};

// ═══════════════════════════════════════════════════════════
// States, cancellation, report
// ═══════════════════════════════════════════════════════════

/// Run-level lifecycle, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Initializing,
    Extracting,
    Chunking,
    Processing,
    Finalizing,
}

impl RunState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Processing => "processing",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Chunk-processing stages, named in failure logs so every failed chunk is
/// traceable to where it died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Labelling,
    Regenerating,
    Assembling,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Labelling => "labelling",
            Self::Regenerating => "regenerating",
            Self::Assembling => "assembling",
        }
    }
}

/// Cooperative run-level cancellation. Cancelling halts dispatch of new
/// chunks; in-flight chunk tasks are left to finish and statistics are
/// still flushed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    /// All dispatched chunks resolved, however many failed.
    Completed,
    /// A fatal error stopped the run.
    Aborted { cause: String },
}

/// Final report, emitted whether the run completed or aborted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    /// True when an external stop request halted dispatch early.
    pub cancelled: bool,
    pub stats: StatsSnapshot,
    pub duration_ms: u64,
    pub finished_at: String,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

/// Owns one pipeline run end to end.
pub struct Orchestrator {
    config: RunConfig,
    client: Arc<dyn LlmClient>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(config: RunConfig, client: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            client,
            cancel: CancelToken::new(),
        }
    }

    /// Handle for stopping the run from outside (signal handler, UI).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the run. Always returns a report; fatal errors surface as
    /// an `Aborted` outcome with whatever statistics accumulated.
    pub async fn run(&self) -> RunReport {
        let stats = Arc::new(RunStatistics::new());
        let started = Instant::now();

        tracing::info!(
            input = %self.config.input.display(),
            output = %self.config.output.display(),
            model = %self.config.model,
            chunk_size = self.config.chunk_size,
            workers = self.config.workers,
            "pipeline starting"
        );

        let result = self.run_inner(&stats).await;
        let snapshot = stats.snapshot();

        let outcome = match result {
            Ok(()) => {
                tracing::info!(
                    pairs = snapshot.pairs_written,
                    failed_chunks = snapshot.chunks_failed,
                    "pipeline complete"
                );
                RunOutcome::Completed
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline aborted");
                RunOutcome::Aborted {
                    cause: e.to_string(),
                }
            }
        };

        RunReport {
            cancelled: self.cancel.is_cancelled() && outcome == RunOutcome::Completed,
            outcome,
            stats: snapshot,
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn run_inner(&self, stats: &Arc<RunStatistics>) -> Result<(), PipelineError> {
        self.transition(RunState::Initializing);
        self.config.validate()?;

        let model = self.config.model.clone();
        let client = Arc::clone(&self.client);
        let available = tokio::task::spawn_blocking(move || client.is_model_available(&model))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
            .map_err(PipelineError::LabelService)?;
        if !available {
            return Err(PipelineError::ModelUnavailable(self.config.model.clone()));
        }

        let writer = Arc::new(DatasetWriter::create(&self.config.output)?);

        self.transition(RunState::Extracting);
        let input = self.config.input.clone();
        let entities = tokio::task::spawn_blocking(move || DxfExtractor::extract_all(&input))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;
        stats.record_entities(entities.len());
        if entities.is_empty() {
            return Err(PipelineError::EmptyDrawing(self.config.input.clone()));
        }

        self.transition(RunState::Chunking);
        let chunks = chunk_entities(entities, self.config.chunk_size, self.config.max_chunks);
        stats.record_chunks(chunks.len());
        tracing::info!(
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            "chunking complete"
        );

        self.transition(RunState::Processing);
        let generator = Arc::new(LabelGenerator::new(
            Arc::clone(&self.client),
            self.config.model.clone(),
            self.config.temperature,
            self.config.min_label_length,
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<Result<(), PipelineError>> = JoinSet::new();
        let mut fatal: Option<PipelineError> = None;

        let total = chunks.len();
        let mut dispatched = 0usize;

        for chunk in chunks {
            if self.cancel.is_cancelled() {
                break;
            }
            // Surface fatal errors from already-finished tasks before
            // dispatching more work.
            while let Some(result) = tasks.try_join_next() {
                self.collect(result, &mut fatal);
            }
            if fatal.is_some() {
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if self.cancel.is_cancelled() {
                break;
            }

            let generator = Arc::clone(&generator);
            let writer = Arc::clone(&writer);
            let stats = Arc::clone(stats);
            dispatched += 1;
            tasks.spawn(async move {
                let _permit = permit;
                process_chunk(chunk, generator, writer, stats).await
            });
        }

        if dispatched < total {
            tracing::warn!(dispatched, total, "dispatch halted before all chunks");
        }

        // Drain in-flight work.
        while let Some(result) = tasks.join_next().await {
            self.collect(result, &mut fatal);
        }

        self.transition(RunState::Finalizing);
        if let Some(err) = fatal {
            return Err(err);
        }

        let snapshot = stats.snapshot();
        if snapshot.chunks_succeeded == 0 && snapshot.total_entities > 0 {
            tracing::warn!(
                "no chunks succeeded despite non-empty input; check model and service configuration"
            );
        }

        Ok(())
    }

    fn collect(
        &self,
        result: Result<Result<(), PipelineError>, tokio::task::JoinError>,
        fatal: &mut Option<PipelineError>,
    ) {
        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(join) => PipelineError::Worker(join.to_string()),
        };
        tracing::error!(error = %failure, "fatal failure in chunk worker; cancelling dispatch");
        if fatal.is_none() {
            *fatal = Some(failure);
        }
        self.cancel.cancel();
    }

    fn transition(&self, state: RunState) {
        tracing::info!(state = state.as_str(), "run state");
    }
}

/// One chunk's task: label → regenerate → assemble.
///
/// Chunk-local failures are absorbed here (recorded and logged); only
/// fatal dataset errors propagate to the orchestrator.
async fn process_chunk(
    chunk: Chunk,
    generator: Arc<LabelGenerator>,
    writer: Arc<DatasetWriter>,
    stats: Arc<RunStatistics>,
) -> Result<(), PipelineError> {
    stats.chunk_attempted();
    let chunk_id = chunk.id;

    let label_chunk = chunk.clone();
    let label = match tokio::task::spawn_blocking(move || generator.generate_label(&label_chunk))
        .await
    {
        Ok(Ok(label)) => label,
        Ok(Err(e)) => {
            fail_chunk(&stats, chunk_id, Stage::Labelling, &e);
            return Ok(());
        }
        Err(join) => {
            fail_chunk(&stats, chunk_id, Stage::Labelling, &join);
            return Ok(());
        }
    };

    let drawing = match regenerate_from_chunk(&chunk) {
        Ok(drawing) => drawing,
        Err(e) => {
            fail_chunk(&stats, chunk_id, Stage::Regenerating, &e);
            return Ok(());
        }
    };
    stats.record_entity_warnings(drawing.warning_count);

    // Assembling: any failure past this point loses a record, which is
    // unacceptable, so escalate instead of absorbing.
    let assembled = TrainingPair::from_parts(&label, &drawing)
        .and_then(|pair| writer.append(chunk_id, &pair));
    if let Err(e) = assembled {
        tracing::error!(
            chunk_id,
            stage = Stage::Assembling.as_str(),
            error = %e,
            "dataset write failed"
        );
        return Err(e.into());
    }
    stats.pair_written();
    stats.chunk_succeeded();

    tracing::info!(
        chunk_id,
        included = drawing.included_count,
        warnings = drawing.warning_count,
        "chunk succeeded"
    );
    Ok(())
}

fn fail_chunk(
    stats: &RunStatistics,
    chunk_id: usize,
    stage: Stage,
    cause: &dyn std::fmt::Display,
) {
    stats.chunk_failed();
    tracing::warn!(chunk_id, stage = stage.as_str(), cause = %cause, "chunk failed");
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
