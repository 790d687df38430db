use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::error;

use btc_outputs_flattener::{load_config, log, run, MalformedPolicy};

#[derive(Parser)]
#[command(name = "stg_btc_outputs")]
#[command(about = "Flatten stg_btc transaction outputs into one row per addressed output", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (TOML). Defaults to ./flatten_config.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source Parquet file (overrides source.path)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Target Parquet file (overrides target.path)
    #[arg(long)]
    output: Option<PathBuf>,

    /// What to do with OUTPUTS cells that are not JSON arrays
    #[arg(long, value_enum)]
    on_malformed: Option<MalformedPolicy>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(p) = &self.input {
            out.push(("source.path", p.to_string_lossy().into_owned()));
        }
        if let Some(p) = &self.output {
            out.push(("target.path", p.to_string_lossy().into_owned()));
        }
        if let Some(policy) = self.on_malformed.and_then(|p| p.to_possible_value()) {
            out.push(("flatten.on_malformed", policy.get_name().to_string()));
        }
        if let Some(level) = &self.log_level {
            out.push(("log.level", level.clone()));
        }
        out
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref(), &cli.overrides()).context("loading configuration")?;
    let _guard = log::init(&cfg.log)?;

    match run(&cfg) {
        Ok(summary) => {
            println!(
                "{}: {} ({} bytes in {:.2}s)",
                cfg.model.name,
                summary.report,
                summary.bytes_written,
                summary.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "run failed");
            Err(e).with_context(|| format!("model {} failed", cfg.model.name))
        }
    }
}
