//! Integration test: tables written through the session read back intact.

use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;

use drover_core::DroverError;
use drover_storage::{MemoryStoreProvider, Session};
use drover_tabular::{
    read_csv_to_df, read_csv_to_df_with_schema, read_json_to_df, read_parquet_to_df, write_df_to_csv, write_df_to_json,
    write_df_to_parquet,
};

fn session() -> Session {
    Session::new(Arc::new(MemoryStoreProvider::new()))
}

fn sensor_table() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("region", DataType::Utf8, false),
        Field::new("readings", DataType::Int64, false),
        Field::new("temp", DataType::Float64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["north", "south", "east, upper"])),
            Arc::new(Int64Array::from(vec![10, 20, 30])),
            Arc::new(Float64Array::from(vec![10.5, 20.25, -3.75])),
        ],
    )
    .unwrap()
}

/// Compare tables column by column, by name, ignoring nullability.
fn assert_same_content(expected: &RecordBatch, actual: &RecordBatch) {
    assert_eq!(actual.num_rows(), expected.num_rows());
    assert_eq!(actual.num_columns(), expected.num_columns());

    for field in expected.schema().fields() {
        let name = field.name();
        let want = expected.column_by_name(name).unwrap();
        let got = actual
            .column_by_name(name)
            .unwrap_or_else(|| panic!("missing column {name}"));
        assert_eq!(got.data_type(), want.data_type(), "type of column {name}");
        assert_eq!(got.to_data(), want.to_data(), "values of column {name}");
    }
}

#[tokio::test]
async fn test_csv_round_trip() {
    let s = session();
    let table = sensor_table();
    write_df_to_csv(&s, &table, "s3://frames/sensors.csv").await.unwrap();

    let text = s.get_string("s3://frames/sensors.csv").await.unwrap();
    assert!(text.starts_with("region,readings,temp\n"));

    let back = read_csv_to_df(&s, "s3://frames/sensors.csv").await.unwrap();
    assert_same_content(&table, &back);
}

#[tokio::test]
async fn test_csv_round_trip_with_schema_keeps_digit_strings() {
    let s = session();
    let schema = Arc::new(Schema::new(vec![
        Field::new("code", DataType::Utf8, false),
        Field::new("qty", DataType::Int64, false),
    ]));
    let table = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(StringArray::from(vec!["007", "012"])),
            Arc::new(Int64Array::from(vec![1, 2])),
        ],
    )
    .unwrap();
    write_df_to_csv(&s, &table, "s3://frames/codes.csv").await.unwrap();

    let inferred = read_csv_to_df(&s, "s3://frames/codes.csv").await.unwrap();
    assert_eq!(inferred.column(0).data_type(), &DataType::Int64);

    let back = read_csv_to_df_with_schema(&s, "s3://frames/codes.csv", schema)
        .await
        .unwrap();
    assert_same_content(&table, &back);
}

#[tokio::test]
async fn test_json_round_trip() {
    let s = session();
    let table = sensor_table();
    write_df_to_json(&s, &table, "s3://frames/sensors.json").await.unwrap();
    let back = read_json_to_df(&s, "s3://frames/sensors.json").await.unwrap();
    assert_same_content(&table, &back);
}

#[tokio::test]
async fn test_parquet_round_trip() {
    let s = session();
    let table = sensor_table();
    write_df_to_parquet(&s, &table, "s3://frames/sensors.parquet")
        .await
        .unwrap();
    let back = read_parquet_to_df(&s, "s3://frames/sensors.parquet")
        .await
        .unwrap();
    assert_same_content(&table, &back);
    assert_eq!(back.schema().fields(), table.schema().fields());
}

#[tokio::test]
async fn test_read_json_array() {
    let s = session();
    s.put(
        "s3://frames/array.json",
        Bytes::from(r#"[{"id": 1, "tag": "a"}, {"id": 2, "tag": "b"}]"#),
    )
    .await
    .unwrap();
    let table = read_json_to_df(&s, "s3://frames/array.json").await.unwrap();
    assert_eq!(table.num_rows(), 2);
    let ids = table
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(ids.values(), &[1, 2]);
}

#[tokio::test]
async fn test_read_missing_propagates_not_found() {
    let s = session();
    assert!(matches!(
        read_csv_to_df(&s, "s3://frames/missing.csv").await,
        Err(DroverError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_read_malformed_is_format_error() {
    let s = session();
    s.put("s3://frames/bad.json", Bytes::from("{\"a\": "))
        .await
        .unwrap();
    assert!(matches!(
        read_json_to_df(&s, "s3://frames/bad.json").await,
        Err(DroverError::Format { .. })
    ));
    assert!(matches!(
        read_parquet_to_df(&s, "s3://frames/bad.json").await,
        Err(DroverError::Format { .. })
    ));
}

#[tokio::test]
async fn test_write_to_directory_path_rejected() {
    let s = session();
    assert!(matches!(
        write_df_to_csv(&s, &sensor_table(), "s3://frames/dir/").await,
        Err(DroverError::InvalidPath { .. })
    ));
}
