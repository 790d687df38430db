use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, Map};
use serde::Deserialize;

use crate::error::{FlattenError, Result};
use crate::flattener::FlattenOptions;
use crate::parquet_io::{Compression, DEFAULT_ROW_GROUP_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "flatten_config.toml";
pub const ENV_PREFIX: &str = "FLATTEN";

/// How the orchestrator persists the model. Recorded in the output, never
/// branched on here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    #[default]
    Table,
    View,
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Materialization::Table => f.write_str("table"),
            Materialization::View => f.write_str("view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub materialized: Materialization,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "stg_btc_outputs".to_string(),
            materialized: Materialization::Table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/stg_btc.parquet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub path: PathBuf,
    pub compression: Compression,
    pub row_group_size: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/stg_btc_outputs.parquet"),
            compression: Compression::default(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rolling log files; stdout only when unset.
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            file_prefix: "stg_btc_outputs.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    pub model: ModelConfig,
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub flatten: FlattenOptions,
    pub log: LogConfig,
}

impl FlattenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.path.as_os_str().is_empty() {
            return Err(FlattenError::Config("source.path must not be empty".into()));
        }
        if self.target.path.as_os_str().is_empty() {
            return Err(FlattenError::Config("target.path must not be empty".into()));
        }
        if self.source.path == self.target.path {
            return Err(FlattenError::Config(format!(
                "source and target both point at {}",
                self.source.path.display()
            )));
        }
        if self.target.row_group_size == 0 {
            return Err(FlattenError::Config("target.row_group_size must be positive".into()));
        }
        if self.flatten.outputs_column.is_empty() {
            return Err(FlattenError::Config("flatten.outputs_column must not be empty".into()));
        }
        Ok(())
    }
}

/// Loads configuration from, in increasing precedence: built-in defaults,
/// the TOML file at `path`, `FLATTEN__*` environment variables, `overrides`.
///
/// A missing file is only an error when `path` was given explicitly.
pub fn load_config(path: Option<&Path>, overrides: &[(&str, String)]) -> Result<FlattenConfig> {
    load_layers(path, None, overrides)
}

/// `env` replaces the process environment when given.
fn load_layers(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
    overrides: &[(&str, String)],
) -> Result<FlattenConfig> {
    let (file, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };

    let mut builder = Config::builder()
        .add_source(File::from(file).required(required))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").source(env));

    for (key, value) in overrides {
        builder = builder
            .set_override(*key, value.as_str())
            .map_err(|e| FlattenError::Config(e.to_string()))?;
    }

    let cfg: FlattenConfig = builder
        .build()
        .and_then(|c| c.try_deserialize::<FlattenConfig>())
        .map_err(|e| FlattenError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}
