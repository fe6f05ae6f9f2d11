use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;

use drover_core::{DroverError, Result};

/// Concatenate decoded batches into one table; no batches yields an empty
/// table with the inferred schema.
pub(crate) fn concat(schema: &Arc<Schema>, batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::clone(schema)));
    }
    arrow::compute::concat_batches(schema, batches)
        .map_err(|e| DroverError::format("Failed to concatenate record batches", e))
}
