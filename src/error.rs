use arrow2::datatypes::DataType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlattenError>;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow2::error::Error),

    /// A cell of the outputs column is not a JSON array (or `null`).
    #[error("malformed outputs JSON at row {row}: {source}")]
    MalformedOutputs {
        row: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("input table has no column named {0:?}")]
    MissingColumn(String),

    #[error("column {name:?} has type {data_type:?}, expected a JSON string column")]
    UnsupportedColumnType { name: String, data_type: DataType },

    #[error("column name {0:?} appears more than once after uppercasing")]
    DuplicateColumn(String),

    #[error("output value at row {row} is not an integer")]
    NonIntegerValue { row: usize },

    #[error("table shape mismatch: {0}")]
    Shape(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
