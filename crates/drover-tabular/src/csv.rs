//! CSV encoding with a header row and inferred column types.

use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use drover_core::{DroverError, Result};

use crate::frame;

/// Parse CSV bytes into a table, inferring column types from every row.
///
/// Inference only sees text, so a column of digit strings such as `007`
/// comes back as `Int64` (`7`). Use [`decode_with_schema`] when the column
/// types are known.
pub fn decode(data: &[u8]) -> Result<RecordBatch> {
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(data), None)
        .map_err(|e| DroverError::format("Failed to infer CSV schema", e))?;
    decode_with_schema(data, Arc::new(schema))
}

/// Parse CSV bytes into a table with the given column types.
pub fn decode_with_schema(data: &[u8], schema: SchemaRef) -> Result<RecordBatch> {
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(Format::default().with_header(true))
        .build(Cursor::new(data))
        .map_err(|e| DroverError::format("Failed to open CSV reader", e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DroverError::format("Failed to parse CSV", e))?;

    frame::concat(&schema, &batches)
}

/// Serialize a table to CSV with a header row.
pub fn encode(table: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
        writer
            .write(table)
            .map_err(|e| DroverError::format("Failed to write CSV", e))?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::DataType;

    #[test]
    fn test_decode_infers_types() {
        let table = decode(b"name,count,ratio\nalpha,1,0.5\nbeta,2,1.25\n").unwrap();
        assert_eq!(table.num_rows(), 2);
        let schema = table.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);

        let counts = table
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(counts.values(), &[1, 2]);
    }

    #[test]
    fn test_decode_with_schema_keeps_leading_zeros() {
        use arrow::datatypes::{Field, Schema};

        let data = b"code\n007\n012\n";
        let inferred = decode(data).unwrap();
        assert_eq!(inferred.schema().field(0).data_type(), &DataType::Int64);

        let schema = Arc::new(Schema::new(vec![Field::new("code", DataType::Utf8, true)]));
        let table = decode_with_schema(data, schema).unwrap();
        let codes = table.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(codes.value(0), "007");
        assert_eq!(codes.value(1), "012");
    }

    #[test]
    fn test_decode_header_only() {
        let table = decode(b"a,b\n").unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn test_decode_ragged_rows_is_format_error() {
        let err = decode(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, DroverError::Format { .. }));
    }

    #[test]
    fn test_encode_quotes_commas() {
        let table = decode(b"city,temp\n\"Paris, FR\",12.5\n").unwrap();
        let out = String::from_utf8(encode(&table).unwrap()).unwrap();
        assert_eq!(out, "city,temp\n\"Paris, FR\",12.5\n");

        let back = decode(out.as_bytes()).unwrap();
        let cities = back.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(cities.value(0), "Paris, FR");
        let temps = back.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(temps.value(0), 12.5);
        assert_eq!(temps.null_count(), 0);
    }
}
