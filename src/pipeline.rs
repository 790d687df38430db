use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::FlattenConfig;
use crate::error::Result;
use crate::flattener::{flatten, FlattenReport};
use crate::parquet_io::{read_parquet, write_parquet, WriteSettings};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: FlattenReport,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

fn footer(cfg: &FlattenConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("model".to_string(), cfg.model.name.clone()),
        ("materialized".to_string(), cfg.model.materialized.to_string()),
        ("source".to_string(), cfg.source.path.display().to_string()),
    ])
}

/// Runs the model once: reads the source table, flattens it, and replaces the
/// target table.
pub fn run(cfg: &FlattenConfig) -> Result<RunSummary> {
    cfg.validate()?;
    let start = Instant::now();
    info!(
        model = %cfg.model.name,
        materialized = %cfg.model.materialized,
        source = %cfg.source.path.display(),
        target = %cfg.target.path.display(),
        "starting run"
    );

    let input = read_parquet(&cfg.source.path)?;
    info!(rows = input.num_rows(), columns = input.num_columns(), "loaded source table");

    let (output, report) = flatten(&input, &cfg.flatten)?;
    drop(input);

    let settings = WriteSettings {
        compression: cfg.target.compression,
        row_group_size: cfg.target.row_group_size,
        key_values: footer(cfg),
    };
    let bytes_written = write_parquet(&output, &cfg.target.path, &settings)?;

    let elapsed = start.elapsed();
    info!(
        %report,
        elapsed_ms = elapsed.as_millis() as u64,
        "run complete ({:.1} rows/sec)",
        report.input_rows as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    Ok(RunSummary {
        report,
        bytes_written,
        elapsed,
    })
}
