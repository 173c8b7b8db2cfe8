//! `taueff process` and `taueff regions`: one sample through the engine.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use tau_core::{SampleKind, Systematic};
use tau_engine::{ChannelKind, Engine, ProcessStats, RunConfig, RunOutput};

use crate::input;

/// What `process` reports on completion.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub sample: String,
    pub channel: ChannelKind,
    pub kind: SampleKind,
    pub period: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub systematics: Vec<Systematic>,
    pub regions: usize,
    pub histograms: usize,
    pub threads: usize,
    pub stats: ProcessStats,
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_path(path).with_context(|| format!("failed to load run config {}", path.display()))
}

pub fn cmd_process(config: &Path, input_path: &Path, output: &Path, threads: Option<usize>) -> Result<RunSummary> {
    let cfg = load_config(config)?;
    let table = input::read_event_table(input_path)?;
    let channel = cfg.channel(table.schema()).with_context(|| format!("channel '{}'", cfg.channel))?;
    let engine = Engine::begin(channel, cfg.engine_options(), table.schema())?;
    tracing::info!(
        sample = %cfg.sample,
        channel = %cfg.channel,
        regions = engine.catalog().len(),
        rows = table.len(),
        "engine ready"
    );

    let threads = threads.unwrap_or(cfg.threads);
    let out: RunOutput = if threads == 1 {
        engine.process(table.rows())?
    } else {
        // 0 lets rayon pick the thread count
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        pool.install(|| engine.process_parallel(&table, cfg.chunk_size))?
    };

    engine.finish(&out, output).with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(events = out.stats.events, fills = out.stats.fills, malformed = out.stats.malformed, "run complete");

    Ok(RunSummary {
        sample: cfg.sample.clone(),
        channel: cfg.channel,
        kind: cfg.sample_kind(),
        period: cfg.period.clone(),
        input: input_path.to_path_buf(),
        output: output.to_path_buf(),
        systematics: engine.systematics().cloned().collect(),
        regions: engine.catalog().len(),
        histograms: out.store.len(),
        threads,
        stats: out.stats,
    })
}

/// Region catalog for a configuration, resolved against the columns of
/// `input` (no rows are read).
pub fn cmd_regions(config: &Path, input_path: &Path) -> Result<serde_json::Value> {
    let cfg = load_config(config)?;
    let schema = input::read_schema(input_path)?;
    let engine = Engine::begin(cfg.channel(&schema)?, cfg.engine_options(), &schema)?;
    let regions: serde_json::Map<String, serde_json::Value> = engine
        .catalog()
        .iter()
        .map(|r| -> Result<(String, serde_json::Value)> { Ok((r.path.clone(), serde_json::to_value(&r.spec)?)) })
        .collect::<Result<_>>()?;
    Ok(serde_json::Value::Object(regions))
}
