//! JSON encoding of tables as records.
//!
//! Reads accept newline-delimited records or a single top-level array of
//! records; writes always produce newline-delimited records.

use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;

use arrow::json::reader::infer_json_schema;
use arrow::json::{LineDelimitedWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;

use drover_core::{DroverError, Result};

use crate::frame;

/// Parse JSON records into a table, inferring the schema from every record.
pub fn decode(data: &[u8]) -> Result<RecordBatch> {
    let records = to_line_delimited(data)?;

    let (schema, _) = infer_json_schema(Cursor::new(records.as_ref()), None)
        .map_err(|e| DroverError::format("Failed to infer JSON schema", e))?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .build(Cursor::new(records.as_ref()))
        .map_err(|e| DroverError::format("Failed to open JSON reader", e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DroverError::format("Failed to parse JSON", e))?;

    frame::concat(&schema, &batches)
}

/// Serialize a table to newline-delimited JSON records.
pub fn encode(table: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = LineDelimitedWriter::new(&mut buf);
        writer
            .write(table)
            .map_err(|e| DroverError::format("Failed to write JSON", e))?;
        writer
            .finish()
            .map_err(|e| DroverError::format("Failed to finish JSON output", e))?;
    }
    Ok(buf)
}

/// Rewrite a top-level array of records as one record per line.
fn to_line_delimited(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let first = data.iter().find(|b| !b.is_ascii_whitespace());
    if first != Some(&b'[') {
        return Ok(Cow::Borrowed(data));
    }

    let records: Vec<serde_json::Value> = serde_json::from_slice(data)
        .map_err(|e| DroverError::format("Failed to parse JSON array", e))?;

    let mut out = Vec::with_capacity(data.len());
    for record in &records {
        if !record.is_object() {
            return Err(DroverError::format_msg(format!(
                "JSON array must contain records, found {record}"
            )));
        }
        serde_json::to_writer(&mut out, record)
            .map_err(|e| DroverError::format("Failed to re-encode JSON record", e))?;
        out.push(b'\n');
    }
    Ok(Cow::Owned(out))
}
