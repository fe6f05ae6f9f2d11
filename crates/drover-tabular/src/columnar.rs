//! Parquet encoding of tables.

use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use arrow::record_batch::RecordBatch;

use drover_core::{DroverError, Result};

use crate::frame;

/// Read a whole Parquet file held in memory into one table.
pub fn decode(data: Bytes) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)
        .map_err(|e| DroverError::format("Failed to open Parquet reader", e))?;
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| DroverError::format("Failed to build Parquet reader", e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DroverError::format("Failed to read Parquet batch", e))?;

    frame::concat(&schema, &batches)
}

/// Write a table to Parquet bytes in memory with LZ4 compression.
pub fn encode(table: &RecordBatch) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::LZ4_RAW)
        .build();

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, table.schema(), Some(props))
            .map_err(|e| DroverError::format("Failed to create Parquet writer", e))?;
        writer
            .write(table)
            .map_err(|e| DroverError::format("Failed to write Parquet data", e))?;
        writer
            .close()
            .map_err(|e| DroverError::format("Failed to close Parquet writer", e))?;
    }
    Ok(buf)
}
