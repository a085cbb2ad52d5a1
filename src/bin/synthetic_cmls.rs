//! Synthetic CML Generator
//!
//! Writes labeled CML records or thickness histories as JSON, for feeding
//! the `cml-optimizer` CLI in demos and tests.
//!
//! # Usage
//! ```bash
//! ./synthetic-cmls --count 500 > records.json
//! ./synthetic-cmls --count 500 --output histories > histories.json
//! cml-optimizer train --records records.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};

use cml_optimizer::synthetic::{histories_by_cml, SyntheticConfig, SyntheticGenerator};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Array of CML records
    Records,
    /// Object of CML id -> thickness history
    Histories,
}

#[derive(Parser, Debug)]
#[command(name = "synthetic-cmls")]
#[command(about = "Synthetic CML records and thickness histories")]
#[command(version)]
struct Args {
    /// Number of CMLs to generate
    #[arg(short, long, default_value = "200", value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    count: u32,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Share of numeric fields left empty (0.0-1.0)
    #[arg(long, default_value = "0.02")]
    missing_rate: f64,

    /// What to write
    #[arg(short, long, value_enum, default_value = "records")]
    output: Output,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.missing_rate) {
        anyhow::bail!("--missing-rate must be within 0.0-1.0, got {}", args.missing_rate);
    }

    let cmls = SyntheticGenerator::new(SyntheticConfig {
        count: args.count as usize,
        seed: args.seed,
        missing_rate: args.missing_rate,
        ..Default::default()
    })
    .generate();

    tracing::info!(count = cmls.len(), seed = args.seed, "Generated synthetic CMLs");

    let value = match args.output {
        Output::Records => {
            let records: Vec<_> = cmls.iter().map(|c| &c.record).collect();
            serde_json::to_value(records)?
        }
        Output::Histories => serde_json::to_value(histories_by_cml(&cmls))?,
    };

    let mut stdout = io::stdout().lock();
    if args.pretty {
        serde_json::to_writer_pretty(&mut stdout, &value)?;
    } else {
        serde_json::to_writer(&mut stdout, &value)?;
    }
    writeln!(stdout).context("failed to write output")?;
    Ok(())
}
