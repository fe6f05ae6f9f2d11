//! Tabular transforms between the object store and Arrow tables.
//!
//! A table is an Arrow [`RecordBatch`]. Reads fetch the object through
//! [`Session::get`] and parse it in memory with schema inference; writes
//! serialize in memory and hand the bytes to [`Session::put`]. Nothing
//! touches local disk.
//!
//! ```no_run
//! # async fn demo(session: &drover_storage::Session) -> drover_core::Result<()> {
//! let table = drover_tabular::read_csv_to_df(session, "s3://data/in.csv").await?;
//! drover_tabular::write_df_to_json(session, &table, "s3://data/out.json").await?;
//! # Ok(())
//! # }
//! ```

pub mod columnar;
pub mod csv;
pub mod json;

mod frame;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use tracing::{debug, instrument};

use drover_core::Result;
use drover_storage::Session;

/// Read a CSV object (with header row) into a table.
#[instrument(skip(session), fields(path = %path))]
pub async fn read_csv_to_df(session: &Session, path: &str) -> Result<RecordBatch> {
    let data = session.get(path).await?;
    let table = csv::decode(&data)?;
    debug!(rows = table.num_rows(), columns = table.num_columns(), "Read CSV table");
    Ok(table)
}

/// Read a CSV object (with header row) into a table with known column types.
///
/// Inference cannot tell a text column of digits from a number column;
/// pinning the schema keeps values such as `007` intact.
#[instrument(skip(session, schema), fields(path = %path))]
pub async fn read_csv_to_df_with_schema(
    session: &Session,
    path: &str,
    schema: SchemaRef,
) -> Result<RecordBatch> {
    let data = session.get(path).await?;
    let table = csv::decode_with_schema(&data, schema)?;
    debug!(rows = table.num_rows(), columns = table.num_columns(), "Read CSV table");
    Ok(table)
}

/// Read a JSON object (newline-delimited records or an array of records)
/// into a table.
#[instrument(skip(session), fields(path = %path))]
pub async fn read_json_to_df(session: &Session, path: &str) -> Result<RecordBatch> {
    let data = session.get(path).await?;
    let table = json::decode(&data)?;
    debug!(rows = table.num_rows(), columns = table.num_columns(), "Read JSON table");
    Ok(table)
}

/// Read a Parquet object into a table.
#[instrument(skip(session), fields(path = %path))]
pub async fn read_parquet_to_df(session: &Session, path: &str) -> Result<RecordBatch> {
    let data = session.get(path).await?;
    let table = columnar::decode(data)?;
    debug!(rows = table.num_rows(), columns = table.num_columns(), "Read Parquet table");
    Ok(table)
}

/// Write a table as CSV with a header row.
#[instrument(skip(session, table), fields(path = %path, rows = table.num_rows()))]
pub async fn write_df_to_csv(session: &Session, table: &RecordBatch, path: &str) -> Result<()> {
    let data = csv::encode(table)?;
    session.put(path, Bytes::from(data)).await
}

/// Write a table as newline-delimited JSON records.
#[instrument(skip(session, table), fields(path = %path, rows = table.num_rows()))]
pub async fn write_df_to_json(session: &Session, table: &RecordBatch, path: &str) -> Result<()> {
    let data = json::encode(table)?;
    session.put(path, Bytes::from(data)).await
}

/// Write a table as a Parquet file.
#[instrument(skip(session, table), fields(path = %path, rows = table.num_rows()))]
pub async fn write_df_to_parquet(session: &Session, table: &RecordBatch, path: &str) -> Result<()> {
    let data = columnar::encode(table)?;
    session.put(path, Bytes::from(data)).await
}
