//! Tests for the append-only bulk loader

mod common;

use bulkload::prelude::*;
use common::{id_name_rows, init_tracing, Call, RecordingConnection, RecordingFactory, Script};

fn target() -> TargetTable {
    TargetTable::new("test", "items")
}

// ==================== Empty Input Tests ====================

#[tokio::test]
async fn test_empty_input_is_noop_without_connection() {
    init_tracing();
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    let outcome = loader
        .load(RowSource::rows(vec![]), &target(), &LoadOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, LoadOutcome::NoOp(NoOpReason::EmptyInput));
    assert_eq!(outcome.rows_affected(), 0);
    assert_eq!(factory.connects(), 0);
}

#[tokio::test]
async fn test_empty_input_does_not_touch_unreachable_database() {
    let loader = BulkLoader::new(RecordingFactory::unreachable());
    let outcome = loader
        .load(RowSource::records(vec![]), &target(), &LoadOptions::default())
        .await
        .unwrap();
    assert!(outcome.is_noop());
}

// ==================== Batching Tests ====================

#[tokio::test]
async fn test_load_sums_batch_counts() {
    init_tracing();
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    let outcome = loader
        .load(id_name_rows(5), &target(), &LoadOptions::default().with_batch_size(2))
        .await
        .unwrap();

    let summary = outcome.summary().copied().unwrap();
    assert_eq!(summary.rows_affected, 5);
    assert_eq!(summary.batches, 3);
    assert_eq!(factory.connects(), 1);

    assert_eq!(
        factory.conn.labels(),
        vec!["BEGIN", "COPY", "COPY", "COPY", "COMMIT", "CLOSE"]
    );
}

#[tokio::test]
async fn test_copy_statement_and_payload() {
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    loader
        .load(id_name_rows(2), &target(), &LoadOptions::default())
        .await
        .unwrap();

    let copies = factory.conn.copies();
    assert_eq!(copies.len(), 1);
    assert_eq!(
        copies[0].0,
        "COPY \"test\".\"items\" (\"id\", \"name\") FROM STDIN WITH (FORMAT csv, DELIMITER ',')"
    );
    assert_eq!(copies[0].1, "1,name_1\n2,name_2\n");
}

#[tokio::test]
async fn test_natural_order_copy_has_no_column_list() {
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    loader
        .load(
            RowSource::rows(vec![vec![Value::Int32(1), Value::Null]]),
            &target(),
            &LoadOptions::default(),
        )
        .await
        .unwrap();

    let copies = factory.conn.copies();
    assert_eq!(
        copies[0].0,
        "COPY \"test\".\"items\" FROM STDIN WITH (FORMAT csv, DELIMITER ',')"
    );
    assert_eq!(copies[0].1, "1,\n");
}

#[tokio::test]
async fn test_records_missing_fields_load_as_null() {
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    loader
        .load(
            RowSource::records(vec![
                Record::new().with("id", 1_i64).with("note", ""),
                Record::new().with("id", 2_i64),
            ]),
            &target(),
            &LoadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(factory.conn.copies()[0].1, "1,\"\"\n2,\n");
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_failing_batch_rolls_back_and_stops() {
    init_tracing();
    let factory = RecordingFactory::new(Script {
        fail_copy_at: Some(1),
        ..Default::default()
    });
    let loader = BulkLoader::new(factory.clone());

    let err = loader
        .load(id_name_rows(6), &target(), &LoadOptions::default().with_batch_size(2))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::TypeConversion);
    assert_eq!(
        factory.conn.labels(),
        vec!["BEGIN", "COPY", "COPY", "ROLLBACK", "CLOSE"]
    );
}

#[tokio::test]
async fn test_connection_failure_propagates() {
    let loader = BulkLoader::new(RecordingFactory::unreachable());
    let err = loader
        .load(id_name_rows(1), &target(), &LoadOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Connection);
}

#[tokio::test]
async fn test_invalid_batch_size_rejected_before_connecting() {
    let factory = RecordingFactory::new(Script::default());
    let loader = BulkLoader::new(factory.clone());

    let err = loader
        .load(id_name_rows(1), &target(), &LoadOptions::default().with_batch_size(0))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(factory.connects(), 0);
}

#[tokio::test]
async fn test_arity_mismatch_is_schema_error() {
    let loader = BulkLoader::new(RecordingFactory::new(Script::default()));
    let err = loader
        .load(
            RowSource::rows_with_columns(["a", "b"], vec![vec![Value::Int32(1)]]),
            &target(),
            &LoadOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Schema);
}

// ==================== External Scope Tests ====================

#[tokio::test]
async fn test_load_with_does_not_commit() {
    let conn = RecordingConnection::new(Script::default());

    let outcome = BulkLoader::load_with(
        &conn,
        id_name_rows(3),
        &target(),
        &LoadOptions::default().with_batch_size(2),
    )
    .await
    .unwrap();

    assert_eq!(outcome.rows_affected(), 3);
    assert_eq!(conn.labels(), vec!["COPY", "COPY"]);
}

#[tokio::test]
async fn test_load_with_rolls_back_caller_transaction_on_error() {
    let conn = RecordingConnection::new(Script {
        fail_copy_at: Some(0),
        ..Default::default()
    });

    let result = BulkLoader::load_with(&conn, id_name_rows(1), &target(), &LoadOptions::default()).await;

    assert!(result.is_err());
    assert_eq!(conn.calls().last(), Some(&Call::Rollback));
    assert!(!conn.calls().contains(&Call::Close));
}
