//! NCRT estimation for one route section
//!
//! Reads a JSON section file (snow event, stations with `u`/`k`/`q` arrays,
//! optional baselines) and writes the section report as JSON.
//!
//! # Usage
//! ```bash
//! ncrt-estimate --input section.json --output report.json --pretty
//! ncrt-estimate --config ncrt_config.toml --check-config
//! ```

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ncrtes::config::{self, EstimationConfig};
use ncrtes::{InMemoryBaselines, SectionEstimator, SectionInput};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ncrt-estimate")]
#[command(about = "Normal Clearance Recovery Time estimation for a route section")]
#[command(version)]
struct Args {
    /// Section JSON file ("-" reads stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Estimation config TOML (default: $NCRT_CONFIG, then ./ncrt_config.toml)
    #[arg(short, long, env = "NCRT_CONFIG")]
    config: Option<PathBuf>,

    /// Report destination (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Validate the configuration, print the effective values and exit
    #[arg(long)]
    check_config: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let estimation_config = match &args.config {
        Some(path) => EstimationConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EstimationConfig::load(),
    };
    estimation_config.validate().context("Invalid estimation config")?;

    if args.check_config {
        let toml = estimation_config.to_toml().context("Failed to render config")?;
        println!("{toml}");
        return Ok(());
    }
    config::init(estimation_config);

    let raw = read_input(&args.input)?;
    let section: SectionInput =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse section input {}", args.input))?;
    info!(
        section = %section.section_id,
        stations = section.stations.len(),
        baselines = section.baselines.len(),
        "Section loaded"
    );

    let estimator = SectionEstimator::new(config::get().clone(), Arc::new(InMemoryBaselines::new()));
    let report = estimator
        .estimate_input(section)
        .context("Section estimation failed")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write report to stdout")?;
        }
    }
    Ok(())
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read section input from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}
