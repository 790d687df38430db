//! Flattens the staged Bitcoin transactions table (`stg_btc`) into one row per
//! transaction output (`stg_btc_outputs`).

pub mod config;
pub mod error;
pub mod flattener;
pub mod log;
pub mod outputs;
pub mod parquet_io;
pub mod pipeline;
pub mod table;

pub use crate::config::{load_config, FlattenConfig, Materialization};
pub use crate::error::{FlattenError, Result};
pub use crate::flattener::{flatten, FlattenOptions, FlattenReport, MalformedPolicy, ValueType};
pub use crate::outputs::{parse_outputs, OutputValue, TxOutput};
pub use crate::parquet_io::{read_parquet, write_parquet, Compression, WriteSettings};
pub use crate::pipeline::{run, RunSummary};
pub use crate::table::Table;
