//! cadforge CLI: `run` drives the full labelling pipeline, `extract`
//! dumps normalized entities from a drawing as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cadforge::config::{
    RunConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_LABEL_LENGTH, DEFAULT_MODEL, DEFAULT_OLLAMA_URL,
    DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS,
};
use cadforge::dxf::DxfExtractor;
use cadforge::labelling::OllamaClient;
use cadforge::pipeline::Orchestrator;

#[derive(Parser)]
#[command(
    name = "cadforge",
    version,
    about = "Convert DXF drawings into instruction-tuning datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: extract, label, regenerate, assemble.
    Run {
        /// Source DXF drawing.
        input: PathBuf,
        /// Output JSONL dataset path.
        #[arg(short, long)]
        output: PathBuf,
        /// Label model identifier.
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Entities per chunk.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Process only the first N chunks (all when omitted).
        #[arg(long)]
        max_chunks: Option<usize>,
        /// Sampling temperature for label generation.
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,
        /// Minimum accepted label length, in characters.
        #[arg(long, default_value_t = DEFAULT_MIN_LABEL_LENGTH)]
        min_label_length: usize,
        /// Concurrently processed chunks.
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Base URL of the Ollama-compatible label service.
        #[arg(long, default_value = DEFAULT_OLLAMA_URL)]
        ollama_url: String,
        /// Per-request timeout for label calls, in seconds.
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout_secs: u64,
    },
    /// Extract entities from a drawing and dump them as JSON.
    Extract {
        /// Source DXF drawing.
        input: PathBuf,
        /// Output JSON path.
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadforge=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            input,
            output,
            model,
            chunk_size,
            max_chunks,
            temperature,
            min_label_length,
            workers,
            ollama_url,
            timeout_secs,
        } => {
            let mut config = RunConfig::new(input, output);
            config.model = model;
            config.chunk_size = chunk_size;
            config.max_chunks = max_chunks;
            config.temperature = temperature;
            config.min_label_length = min_label_length;
            config.workers = workers;
            config.ollama_url = ollama_url;
            config.timeout_secs = timeout_secs;
            run_pipeline(config)
        }
        Command::Extract { input, output } => extract_entities(&input, &output),
    }
}

fn run_pipeline(config: RunConfig) -> ExitCode {
    // The HTTP client is built outside the async runtime; label calls run
    // on blocking threads.
    let client = match OllamaClient::new(&config.ollama_url, config.timeout_secs) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to build label service client");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let output = config.output.clone();
    let orchestrator = Orchestrator::new(config, client);
    let cancel = orchestrator.cancel_token();

    let report = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("stop requested; finishing in-flight chunks");
                cancel.cancel();
            }
        });
        orchestrator.run().await
    });

    println!("Run statistics:");
    println!("{}", report.stats);
    if report.succeeded() {
        println!(
            "✓ Pipeline successful: {} training pairs written to {}",
            report.stats.pairs_written,
            output.display()
        );
        ExitCode::SUCCESS
    } else {
        println!("✗ Pipeline aborted");
        ExitCode::FAILURE
    }
}

fn extract_entities(input: &Path, output: &Path) -> ExitCode {
    let entities = match DxfExtractor::extract_all(input) {
        Ok(entities) => entities,
        Err(e) => {
            tracing::error!(error = %e, "extraction failed");
            return ExitCode::FAILURE;
        }
    };

    let json = match serde_json::to_string_pretty(&entities) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize entities");
            return ExitCode::FAILURE;
        }
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %e, "failed to create output directory");
                return ExitCode::FAILURE;
            }
        }
    }
    if let Err(e) = std::fs::write(output, json) {
        tracing::error!(error = %e, path = %output.display(), "failed to write entity dump");
        return ExitCode::FAILURE;
    }

    println!("✓ Saved {} entities to {}", entities.len(), output.display());
    ExitCode::SUCCESS
}
