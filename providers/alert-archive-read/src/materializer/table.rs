//! Typed query result and its JSON / Arrow encodings

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{Field, Schema};
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};

use alert_archive_common::{CellValue, DeclaredType, Result};

/// One entity-observation with typed store fields and derived `v:` fields
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow {
    pub key: String,
    pub fields: BTreeMap<String, CellValue>,
    pub derived: BTreeMap<&'static str, CellValue>,
}

impl MaterializedRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
            derived: BTreeMap::new(),
        }
    }

    /// Store field first, then derived field
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .get(column)
            .or_else(|| self.derived.get(column))
    }

    /// Numeric value, `None` for nulls and NaN
    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column)
            .and_then(CellValue::as_f64)
            .filter(|v| !v.is_nan())
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(CellValue::as_i64)
    }

    pub fn str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(CellValue::as_str)
    }
}

/// Materialized query result: column descriptors plus rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertTable {
    /// Store columns in schema order
    pub columns: Vec<(String, DeclaredType)>,
    /// Derived columns in computation order
    pub derived_columns: Vec<(&'static str, DeclaredType)>,
    pub rows: Vec<MaterializedRow>,
}

impl AlertTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == column)
            || self.derived_columns.iter().any(|(name, _)| *name == column)
    }

    /// Keep rows matching `predicate`, preserving order
    pub fn retain(&mut self, predicate: impl FnMut(&MaterializedRow) -> bool) {
        self.rows.retain(predicate);
    }

    /// Row-oriented JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (name, _) in &self.columns {
                    let value = row.fields.get(name).map_or(Value::Null, CellValue::to_json);
                    object.insert(name.clone(), value);
                }
                for (name, _) in &self.derived_columns {
                    let value = row.derived.get(name).map_or(Value::Null, CellValue::to_json);
                    object.insert(name.to_string(), value);
                }
                Value::Object(object)
            })
            .collect()
    }

    /// Columnar view of the table as one Arrow record batch.
    ///
    /// Boolean columns holding unconverted text fall back to Utf8.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let columns = self
            .columns
            .iter()
            .map(|(name, t)| (name.as_str(), *t, false))
            .chain(self.derived_columns.iter().map(|(name, t)| (*name, *t, true)));

        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        for (name, declared, derived) in columns {
            let cells: Vec<Option<&CellValue>> = self
                .rows
                .iter()
                .map(|row| {
                    if derived {
                        row.derived.get(name)
                    } else {
                        row.fields.get(name)
                    }
                })
                .collect();
            let array = build_array(declared, &cells);
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(schema, arrays)?)
    }

    /// Arrow IPC stream holding the whole table
    pub fn encode_ipc(&self) -> Result<Vec<u8>> {
        let batch = self.to_record_batch()?;
        let mut out = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut out, &batch.schema())?;
            writer.write(&batch)?;
            writer.finish()?;
        }
        Ok(out)
    }
}

fn build_array(declared: DeclaredType, cells: &[Option<&CellValue>]) -> ArrayRef {
    let text_in_bool = declared == DeclaredType::Boolean
        && cells.iter().any(|c| matches!(c, Some(CellValue::Str(_))));

    match declared {
        DeclaredType::NullableInt64 => {
            let mut builder = Int64Builder::with_capacity(cells.len());
            for &cell in cells {
                builder.append_option(cell.and_then(|c| c.as_i64()));
            }
            Arc::new(builder.finish())
        }
        DeclaredType::Float64 => {
            let mut builder = Float64Builder::with_capacity(cells.len());
            for &cell in cells {
                builder.append_option(cell.and_then(|c| c.as_f64()));
            }
            Arc::new(builder.finish())
        }
        DeclaredType::Boolean if !text_in_bool => {
            let mut builder = BooleanBuilder::with_capacity(cells.len());
            for &cell in cells {
                builder.append_option(match cell {
                    Some(CellValue::Bool(v)) => Some(*v),
                    _ => None,
                });
            }
            Arc::new(builder.finish())
        }
        DeclaredType::Boolean | DeclaredType::String => {
            let mut builder = StringBuilder::new();
            for &cell in cells {
                match cell {
                    None | Some(CellValue::Null) => builder.append_null(),
                    Some(CellValue::Str(v)) => builder.append_value(v),
                    Some(other) => builder.append_value(other.to_json().to_string()),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, BooleanArray, Int64Array, StringArray};
    use arrow::ipc::reader::StreamReader;
    use pretty_assertions::assert_eq;

    fn table() -> AlertTable {
        let mut a = MaterializedRow::new("ZTF1_2459000.5");
        a.fields.insert("i:objectId".to_string(), "ZTF1".into());
        a.fields.insert("i:fid".to_string(), CellValue::Int(1));
        a.fields.insert("d:flag".to_string(), CellValue::Bool(true));
        a.derived.insert("v:rate", CellValue::Float(f64::NAN));

        let mut b = MaterializedRow::new("ZTF2_2459001.5");
        b.fields.insert("i:objectId".to_string(), "ZTF2".into());
        b.fields.insert("i:fid".to_string(), CellValue::Null);
        b.fields.insert("d:flag".to_string(), CellValue::Bool(false));
        b.derived.insert("v:rate", CellValue::Float(-0.5));

        AlertTable {
            columns: vec![
                ("i:objectId".to_string(), DeclaredType::String),
                ("i:fid".to_string(), DeclaredType::NullableInt64),
                ("d:flag".to_string(), DeclaredType::Boolean),
            ],
            derived_columns: vec![("v:rate", DeclaredType::Float64)],
            rows: vec![a, b],
        }
    }

    #[test]
    fn test_json_rows() {
        let rows = table().to_json_rows();
        assert_eq!(rows[0]["i:objectId"], "ZTF1");
        assert_eq!(rows[0]["v:rate"], Value::Null);
        assert_eq!(rows[1]["i:fid"], Value::Null);
        assert_eq!(rows[1]["v:rate"], -0.5);
        assert_eq!(rows[1]["d:flag"], false);
    }

    #[test]
    fn test_record_batch_types() {
        let batch = table().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);

        let fid = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(fid.value(0), 1);
        assert!(fid.is_null(1));

        let flag = batch.column(2).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(flag.value(0));
    }

    #[test]
    fn test_unconverted_booleans_stay_text() {
        let mut table = table();
        table.rows[1]
            .fields
            .insert("d:flag".to_string(), CellValue::Str("True".to_string()));
        let batch = table.to_record_batch().unwrap();
        let flag = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(flag.value(0), "true");
        assert_eq!(flag.value(1), "True");
    }

    #[test]
    fn test_ipc_stream_reads_back() {
        let bytes = table().encode_ipc().unwrap();
        let reader = StreamReader::try_new(std::io::Cursor::new(bytes), None).unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 2);
    }
}
