use arrow2::array::{new_empty_array, Array};
use arrow2::chunk::Chunk;
use arrow2::compute::concatenate::concatenate;
use arrow2::datatypes::{Field, Schema};

use crate::error::{FlattenError, Result};

/// An in-memory table: one schema and one chunk of equally long columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Schema,
    chunk: Chunk<Box<dyn Array>>,
}

impl Table {
    pub fn try_new(schema: Schema, arrays: Vec<Box<dyn Array>>) -> Result<Self> {
        if schema.fields.len() != arrays.len() {
            return Err(FlattenError::Shape(format!(
                "schema has {} fields but {} columns were given",
                schema.fields.len(),
                arrays.len()
            )));
        }
        for (field, array) in schema.fields.iter().zip(&arrays) {
            if field.data_type() != array.data_type() {
                return Err(FlattenError::Shape(format!(
                    "column {:?} is declared {:?} but holds {:?}",
                    field.name,
                    field.data_type(),
                    array.data_type()
                )));
            }
        }
        let chunk = Chunk::try_new(arrays)?;
        Ok(Self { schema, chunk })
    }

    /// Builds a table with the given schema and no rows.
    pub fn empty(schema: Schema) -> Self {
        let arrays = schema
            .fields
            .iter()
            .map(|f| new_empty_array(f.data_type().clone()))
            .collect();
        Self {
            schema,
            chunk: Chunk::new(arrays),
        }
    }

    /// Concatenates row groups that share `schema` into a single table.
    pub fn concat(schema: Schema, chunks: Vec<Chunk<Box<dyn Array>>>) -> Result<Self> {
        match chunks.len() {
            0 => Ok(Self::empty(schema)),
            1 => {
                let arrays = chunks.into_iter().next().map(Chunk::into_arrays).unwrap_or_default();
                Self::try_new(schema, arrays)
            }
            _ => {
                let mut arrays = Vec::with_capacity(schema.fields.len());
                for col in 0..schema.fields.len() {
                    let parts: Vec<&dyn Array> =
                        chunks.iter().map(|c| c.arrays()[col].as_ref()).collect();
                    arrays.push(concatenate(&parts)?);
                }
                Self::try_new(schema, arrays)
            }
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn chunk(&self) -> &Chunk<Box<dyn Array>> {
        &self.chunk
    }

    pub fn fields(&self) -> &[Field] {
        &self.schema.fields
    }

    pub fn num_rows(&self) -> usize {
        self.chunk.len()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.fields.iter().position(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&dyn Array> {
        self.column_index(name)
            .map(|i| self.chunk.arrays()[i].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow2::array::{Int64Array, Utf8Array};
    use arrow2::datatypes::DataType;

    fn schema() -> Schema {
        Schema::from(vec![
            Field::new("txid", DataType::Utf8, false),
            Field::new("fee", DataType::Int64, true),
        ])
    }

    fn chunk(ids: &[&str], fees: &[Option<i64>]) -> Chunk<Box<dyn Array>> {
        Chunk::new(vec![
            Utf8Array::<i32>::from_slice(ids).boxed(),
            Int64Array::from(fees.to_vec()).boxed(),
        ])
    }

    #[test]
    fn lookup_by_name() {
        let t = Table::try_new(schema(), chunk(&["a", "b"], &[Some(1), None]).into_arrays()).unwrap();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.num_columns(), 2);
        assert_eq!(t.column_names(), vec!["txid", "fee"]);
        assert_eq!(t.column_index("fee"), Some(1));
        assert!(t.column("FEE").is_none());
        assert_eq!(t.column("fee").unwrap().null_count(), 1);
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Table::try_new(
            schema(),
            vec![
                Utf8Array::<i32>::from_slice(["a"]).boxed(),
                Int64Array::from(vec![Some(1), Some(2)]).boxed(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, FlattenError::Arrow(_)));
    }

    #[test]
    fn rejects_wrong_column_count_and_type() {
        let err = Table::try_new(schema(), vec![Utf8Array::<i32>::from_slice(["a"]).boxed()]).unwrap_err();
        assert!(matches!(err, FlattenError::Shape(_)));

        let err = Table::try_new(
            schema(),
            vec![
                Int64Array::from(vec![Some(1)]).boxed(),
                Int64Array::from(vec![Some(1)]).boxed(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, FlattenError::Shape(_)));
    }

    #[test]
    fn concat_row_groups() {
        let t = Table::concat(
            schema(),
            vec![chunk(&["a"], &[Some(1)]), chunk(&["b", "c"], &[None, Some(3)])],
        )
        .unwrap();
        assert_eq!(t.num_rows(), 3);
        let ids = t.column("txid").unwrap().as_any().downcast_ref::<Utf8Array<i32>>().unwrap();
        assert_eq!(ids.values_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn concat_nothing_is_empty() {
        let t = Table::concat(schema(), vec![]).unwrap();
        assert_eq!(t.num_rows(), 0);
        assert_eq!(t.num_columns(), 2);
    }
}
