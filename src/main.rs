//! CML Optimizer CLI
//!
//! Operator entry point for the elimination pipeline. Reads CML records and
//! thickness histories as JSON files, writes JSON results to stdout and logs
//! to stderr.
//!
//! # Usage
//! ```bash
//! cml-optimizer train --records records.json
//! cml-optimizer predict --records candidates.json --threshold 0.8
//! cml-optimizer explain --records candidates.json --background records.json
//! cml-optimizer importance
//! cml-optimizer forecast --histories histories.json --horizon 36
//! cml-optimizer runs --limit 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use cml_optimizer::config::{self, PipelineConfig};
use cml_optimizer::forecast::ForecastEngine;
use cml_optimizer::ml_engine::{
    ensure_unique_ids, EliminationModel, ModelTrainingRun, TrainingRunStore,
    ELIMINATION_MODEL_TYPE,
};
use cml_optimizer::types::{CmlRecord, ThicknessObservation};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cml-optimizer")]
#[command(about = "CML elimination modeling and wall-thickness forecasting")]
#[command(version)]
struct CliArgs {
    /// Pipeline config file (overrides CML_CONFIG and ./cml_config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CML_JSON_LOGS")]
    json_logs: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Train the elimination classifier on labeled records
    Train {
        /// JSON array of labeled CML records
        #[arg(long)]
        records: PathBuf,

        /// Held-out share (defaults to model.test_fraction)
        #[arg(long)]
        test_fraction: Option<f64>,
    },

    /// Predict elimination for CML records
    Predict {
        /// JSON array of CML records
        #[arg(long)]
        records: PathBuf,

        /// Elimination threshold (defaults to model.default_threshold)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Explain predictions with per-feature attributions
    Explain {
        /// JSON array of CML records to explain
        #[arg(long)]
        records: PathBuf,

        /// JSON array of background records (defaults to --records)
        #[arg(long)]
        background: Option<PathBuf>,
    },

    /// Print gain-based feature importance of the trained model
    Importance,

    /// Forecast wall thickness per CML
    Forecast {
        /// JSON object of CML id -> [{"ds": "YYYY-MM-DD", "y": mm}, ...]
        #[arg(long)]
        histories: PathBuf,

        /// Periods to forecast (defaults to forecast.horizon_months)
        #[arg(long)]
        horizon: Option<usize>,
    },

    /// List recent training runs, newest first
    Runs {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if pretty {
        serde_json::to_writer_pretty(&mut stdout, value)?;
    } else {
        serde_json::to_writer(&mut stdout, value)?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn trained_model(cfg: &PipelineConfig) -> Result<EliminationModel> {
    let model = EliminationModel::from_config(cfg);
    if !model.is_trained() {
        anyhow::bail!(
            "no trained model at {}; run `cml-optimizer train` first",
            cfg.model.artifact_path.display()
        );
    }
    Ok(model)
}

// ============================================================================
// Commands
// ============================================================================

fn run_train(cfg: &PipelineConfig, records: &Path, test_fraction: Option<f64>, pretty: bool) -> Result<()> {
    let records: Vec<CmlRecord> = read_json(records)?;
    let model = EliminationModel::from_config(cfg);
    let params = cfg.boosting.to_params();
    let store = TrainingRunStore::open(&cfg.storage.runs_db_path).with_context(|| {
        format!("opening run registry {}", cfg.storage.runs_db_path.display())
    })?;

    let outcome = model.train(&records, test_fraction.unwrap_or(cfg.model.test_fraction));
    let mut run = match &outcome {
        Ok(metrics) => ModelTrainingRun::succeeded(
            ELIMINATION_MODEL_TYPE,
            params,
            metrics.clone(),
            model.model_path(),
        ),
        Err(e) => {
            error!(error = %e, "Training failed");
            ModelTrainingRun::failed(ELIMINATION_MODEL_TYPE, params, e, model.model_path())
        }
    };
    store.record(&mut run).context("recording training run")?;
    info!(run_id = %run.id, status = ?run.status, "Recorded training run");

    let metrics = outcome.context("training elimination model")?;
    print_json(&metrics, pretty)
}

fn run_predict(cfg: &PipelineConfig, records: &Path, threshold: Option<f64>, pretty: bool) -> Result<()> {
    let records: Vec<CmlRecord> = read_json(records)?;
    let model = trained_model(cfg)?;
    let predictions = model.predict(&records, threshold.unwrap_or(cfg.model.default_threshold))?;
    print_json(&predictions, pretty)
}

fn run_explain(
    cfg: &PipelineConfig,
    records: &Path,
    background: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let records: Vec<CmlRecord> = read_json(records)?;
    ensure_unique_ids(&records)?;
    let background: Vec<CmlRecord> = match background {
        Some(path) => read_json(path)?,
        None => records.clone(),
    };

    let model = trained_model(cfg)?;
    let artifact = model.artifact().context("model unpublished while explaining")?;
    let rows = EliminationModel::feature_rows(&artifact, &records)?;
    let background_rows = EliminationModel::feature_rows(&artifact, &background)?;

    let mut explainer = model
        .explainer()
        .context("model unpublished while explaining")?
        .with_top_k(cfg.explain.top_k)
        .with_background_size(cfg.explain.background_size);
    explainer.initialize(&background_rows);

    let batch = explainer.explain(&rows, &artifact.feature_columns);
    let by_cml: BTreeMap<&str, _> = records
        .iter()
        .map(|r| r.cml_id.as_str())
        .zip(&batch.explanations)
        .collect();

    print_json(
        &serde_json::json!({
            "explanations": by_cml,
            "feature_importance": batch.feature_importance,
        }),
        pretty,
    )
}

fn run_forecast(cfg: &PipelineConfig, histories: &Path, horizon: Option<usize>, pretty: bool) -> Result<()> {
    let series: BTreeMap<String, Vec<ThicknessObservation>> = read_json(histories)?;
    let engine = ForecastEngine::with_method(cfg.forecast.method, cfg.forecast.interval_width);
    let horizon = horizon.unwrap_or(cfg.forecast.horizon_months);

    let results = engine.forecast_many(&series, horizon);
    let failed = results.values().filter(|r| r.is_err()).count();
    info!(cmls = results.len(), failed, horizon, "Forecast batch complete");

    let output: BTreeMap<String, serde_json::Value> = results
        .into_iter()
        .map(|(cml_id, result)| {
            let value = match result {
                Ok(points) => serde_json::json!({ "forecast": points }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            (cml_id, value)
        })
        .collect();
    print_json(&output, pretty)
}

fn run_runs(cfg: &PipelineConfig, limit: usize, pretty: bool) -> Result<()> {
    let store = TrainingRunStore::open(&cfg.storage.runs_db_path).with_context(|| {
        format!("opening run registry {}", cfg.storage.runs_db_path.display())
    })?;
    let runs = store.history(ELIMINATION_MODEL_TYPE, limit)?;
    print_json(&runs, pretty)
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let pipeline_config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::load(),
    };
    config::init(pipeline_config);
    let cfg = config::get();

    match &args.command {
        SubCommand::Train {
            records,
            test_fraction,
        } => run_train(cfg, records, *test_fraction, args.pretty),
        SubCommand::Predict { records, threshold } => {
            run_predict(cfg, records, *threshold, args.pretty)
        }
        SubCommand::Explain {
            records,
            background,
        } => run_explain(cfg, records, background.as_deref(), args.pretty),
        SubCommand::Importance => {
            let model = trained_model(cfg)?;
            print_json(&model.feature_importance(), args.pretty)
        }
        SubCommand::Forecast { histories, horizon } => {
            run_forecast(cfg, histories, *horizon, args.pretty)
        }
        SubCommand::Runs { limit } => run_runs(cfg, *limit, args.pretty),
    }
}
