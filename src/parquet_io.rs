use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow2::array::Array;
use arrow2::chunk::Chunk;
use arrow2::io::parquet::read::{infer_schema, read_metadata, FileReader};
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, KeyValue, RowGroupIterator, Version,
    WriteOptions,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::table::Table;

pub const DEFAULT_ROW_GROUP_SIZE: usize = 65_536;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl Compression {
    fn options(self) -> CompressionOptions {
        match self {
            Compression::Snappy => CompressionOptions::Snappy,
            Compression::Zstd => CompressionOptions::Zstd(None),
            Compression::Uncompressed => CompressionOptions::Uncompressed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSettings {
    pub compression: Compression,
    pub row_group_size: usize,
    /// Stamped into the file footer as key/value metadata.
    pub key_values: BTreeMap<String, String>,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            key_values: BTreeMap::new(),
        }
    }
}

impl WriteSettings {
    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            write_statistics: true,
            compression: self.compression.options(),
            version: Version::V2,
            data_pagesize_limit: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────

/// Reads every row group of a Parquet file into one table.
pub fn read_parquet(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let mut file = File::open(path)?;

    let metadata = read_metadata(&mut file)?;
    let schema = infer_schema(&metadata)?;
    let row_groups = metadata.row_groups.len();

    let chunks = FileReader::new(file, metadata.row_groups, schema.clone(), None, None, None)
        .collect::<arrow2::error::Result<Vec<_>>>()?;

    let table = Table::concat(schema, chunks)?;
    debug!(
        path = %path.display(),
        row_groups,
        rows = table.num_rows(),
        "read parquet file"
    );
    Ok(table)
}

/// Returns the key/value pairs stored in a Parquet file's footer.
pub fn read_key_value_metadata(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let mut file = File::open(path.as_ref())?;
    let metadata = read_metadata(&mut file)?;
    Ok(metadata
        .key_value_metadata
        .unwrap_or_default()
        .into_iter()
        .filter_map(|kv| kv.value.map(|v| (kv.key, v)))
        .collect())
}

// ─────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────

fn row_groups(table: &Table, row_group_size: usize) -> Vec<Chunk<Box<dyn Array>>> {
    let rows = table.num_rows();
    let step = row_group_size.max(1);
    let mut chunks = Vec::with_capacity(rows.div_ceil(step));
    let mut offset = 0;
    while offset < rows {
        let len = step.min(rows - offset);
        let arrays = table
            .chunk()
            .arrays()
            .iter()
            .map(|a| a.sliced(offset, len))
            .collect();
        chunks.push(Chunk::new(arrays));
        offset += len;
    }
    chunks
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = OsString::from(path.as_os_str());
    staged.push(".tmp");
    PathBuf::from(staged)
}

fn write_file(table: &Table, path: &Path, settings: &WriteSettings) -> Result<u64> {
    let options = settings.write_options();
    let schema = table.schema().clone();

    let encodings: Vec<Vec<Encoding>> = schema
        .fields
        .iter()
        .map(|f| transverse(f.data_type(), |_| Encoding::Plain))
        .collect();

    let chunks = row_groups(table, settings.row_group_size);
    let groups = RowGroupIterator::try_new(chunks.into_iter().map(Ok), &schema, options, encodings)?;

    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, schema, options)?;
    for group in groups {
        writer.write(group?)?;
    }

    let key_values = settings
        .key_values
        .iter()
        .map(|(k, v)| KeyValue {
            key: k.clone(),
            value: Some(v.clone()),
        })
        .collect::<Vec<_>>();
    let size = writer.end(Some(key_values))?;
    Ok(size)
}

/// Materializes `table` at `path`, replacing any previous file.
///
/// The file is written next to the target and renamed into place, so a
/// failed run never leaves a truncated table behind.
pub fn write_parquet(table: &Table, path: impl AsRef<Path>, settings: &WriteSettings) -> Result<u64> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staged = staging_path(path);
    let size = match write_file(table, &staged, settings) {
        Ok(size) => size,
        Err(e) => {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }
    };
    fs::rename(&staged, path)?;

    info!(
        path = %path.display(),
        rows = table.num_rows(),
        bytes = size,
        "wrote parquet file"
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow2::array::{Int64Array, Utf8Array};
    use arrow2::datatypes::{DataType, Field, Schema};

    fn sample(rows: usize) -> Table {
        let schema = Schema::from(vec![
            Field::new("ADDRESS", DataType::Utf8, false),
            Field::new("VALUE", DataType::Int64, true),
        ]);
        let addresses: Vec<String> = (0..rows).map(|i| format!("addr{i}")).collect();
        let values: Vec<Option<i64>> = (0..rows as i64).map(|i| (i % 3 != 0).then_some(i)).collect();
        Table::try_new(
            schema,
            vec![
                Utf8Array::<i32>::from_slice(&addresses).boxed(),
                Int64Array::from(values).boxed(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn splits_into_row_groups() {
        let table = sample(10);
        let groups = row_groups(&table, 4);
        assert_eq!(groups.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert!(row_groups(&sample(0), 4).is_empty());
    }

    #[test]
    fn staging_path_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("out/stg_btc_outputs.parquet")),
            PathBuf::from("out/stg_btc_outputs.parquet.tmp")
        );
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/t.parquet");
        let table = sample(25);

        let settings = WriteSettings {
            row_group_size: 10,
            key_values: BTreeMap::from([("model".to_string(), "stg_btc_outputs".to_string())]),
            ..Default::default()
        };
        let size = write_parquet(&table, &path, &settings).unwrap();
        assert!(size > 0);
        assert!(!staging_path(&path).exists());

        let back = read_parquet(&path).unwrap();
        assert_eq!(back.num_rows(), 25);
        assert_eq!(back.column_names(), vec!["ADDRESS", "VALUE"]);
        assert_eq!(back.chunk().arrays(), table.chunk().arrays());

        let kv = read_key_value_metadata(&path).unwrap();
        assert_eq!(kv.get("model").map(String::as_str), Some("stg_btc_outputs"));
    }

    #[test]
    fn empty_tables_keep_their_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let settings = WriteSettings {
            compression: Compression::Uncompressed,
            ..Default::default()
        };
        write_parquet(&sample(0), &path, &settings).unwrap();

        let back = read_parquet(&path).unwrap();
        assert_eq!(back.num_rows(), 0);
        assert_eq!(back.column_names(), vec!["ADDRESS", "VALUE"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_parquet("/nonexistent/stg_btc.parquet").unwrap_err();
        assert!(matches!(err, crate::error::FlattenError::Io(_)));
    }
}
