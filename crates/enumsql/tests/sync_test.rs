//! Tests for table passes, database passes and fan-out

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    descriptor, descriptor_with, dialect_ref, row, MockConnection, MockFactory,
    RecordingReporter, SharedFactory,
};
use enumsql::connection::ConnectionConfig;
use enumsql::descriptor::{DeletionPolicy, EnumDescriptor, TableConfig};
use enumsql::error::{Error, ErrorCategory};
use enumsql::report::SyncReporter;
use enumsql::schema::LiveColumn;
use enumsql::sync::{sync_table, Replicator, SyncOptions};

fn replicator(descriptors: Vec<EnumDescriptor>, reporter: Arc<RecordingReporter>) -> Replicator {
    Replicator::new(descriptors).with_reporter(reporter as Arc<dyn SyncReporter>)
}

/// Live shape without the Description column
fn without_description(d: &EnumDescriptor) -> Vec<LiveColumn> {
    d.columns()
        .iter()
        .filter(|c| c.name != "Description")
        .map(LiveColumn::from_descriptor)
        .collect()
}

// ==================== Table Pass Tests ====================

#[tokio::test]
async fn test_missing_table_is_created_and_filled() {
    let d = descriptor("Color", &[(1, "Red"), (2, "Green")]);
    let conn = MockConnection::new("db").with_missing_table(&d);
    let reporter = RecordingReporter::new();

    let summary = sync_table(&conn, dialect_ref(), &d, reporter.as_ref())
        .await
        .unwrap();

    assert!(conn.table_exists(&d));
    assert!(conn.statements()[0].contains("create table [dbo].[Color]"));
    assert_eq!(summary.inserted, 2);
    assert_eq!(conn.rows(&d), vec![row(1, "Red"), row(2, "Green")]);
}

#[tokio::test]
async fn test_second_pass_only_reads() {
    let d = descriptor_with(
        TableConfig::new("Color").with_deletion_policy(DeletionPolicy::TryDelete),
        &[(1, "Red")],
    );
    let conn = MockConnection::new("db").with_table(&d, &[row(1, "Rouge"), row(5, "Old")]);
    let reporter = RecordingReporter::new();

    sync_table(&conn, dialect_ref(), &d, reporter.as_ref())
        .await
        .unwrap();
    let before = conn.statements().len();

    let summary = sync_table(&conn, dialect_ref(), &d, reporter.as_ref())
        .await
        .unwrap();

    assert!(summary.is_noop());
    assert_eq!(conn.statements().len(), before + 1);
    assert_eq!(conn.rows(&d), vec![row(1, "Red")]);
}

#[tokio::test]
async fn test_schema_mismatch_writes_nothing() {
    let d = descriptor("Color", &[(1, "Red")]);
    let conn = MockConnection::new("db").with_columns(&d, without_description(&d));

    let err = sync_table(&conn, dialect_ref(), &d, RecordingReporter::new().as_ref())
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Schema);
    assert!(err.to_string().contains("[Description] nvarchar(max) not null"));
    assert!(conn.writes().is_empty());
}

// ==================== Database Pass Tests ====================

#[tokio::test]
async fn test_table_failure_carries_table_identity() {
    let bad = descriptor("Bad", &[(1, "A")]);
    let conn = MockConnection::new("db").with_columns(&bad, without_description(&bad));
    let reporter = RecordingReporter::new();

    let report = replicator(vec![bad], reporter.clone())
        .update_database(&conn)
        .await;

    assert!(!report.is_success());
    let err = report.tables[0].result.as_ref().unwrap_err();
    assert_eq!(err.table(), Some("dbo.Bad"));
    assert!(matches!(err, Error::Table { .. }));

    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "dbo.Bad");
}

#[tokio::test]
async fn test_table_failure_stops_database_by_default() {
    let bad = descriptor("Bad", &[(1, "A")]);
    let good = descriptor("Good", &[(1, "A")]);
    let conn = MockConnection::new("db")
        .with_columns(&bad, without_description(&bad))
        .with_table(&good, &[]);

    let report = replicator(vec![bad, good.clone()], RecordingReporter::new())
        .update_database(&conn)
        .await;

    assert_eq!(report.tables.len(), 1);
    assert!(conn.rows(&good).is_empty());
}

#[tokio::test]
async fn test_continue_on_table_error() {
    let bad = descriptor("Bad", &[(1, "A")]);
    let good = descriptor("Good", &[(1, "A")]);
    let conn = MockConnection::new("db")
        .with_columns(&bad, without_description(&bad))
        .with_table(&good, &[]);

    let options = SyncOptions {
        continue_on_table_error: true,
        ..Default::default()
    };
    let report = replicator(vec![bad, good.clone()], RecordingReporter::new())
        .with_options(options)
        .update_database(&conn)
        .await;

    assert_eq!(report.tables.len(), 2);
    assert!(report.tables[0].result.is_err());
    assert_eq!(report.tables[1].result.as_ref().unwrap().inserted, 1);
    assert_eq!(report.tables[1].enum_name, "Good");
    assert_eq!(conn.rows(&good), vec![row(1, "A")]);
    assert_eq!(report.errors().count(), 1);
}

#[tokio::test]
async fn test_table_timeout() {
    let d = descriptor("Slow", &[(1, "A")]);
    let conn = MockConnection::new("db")
        .with_table(&d, &[])
        .with_delay(Duration::from_millis(500));

    let options = SyncOptions {
        table_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let report = replicator(vec![d], RecordingReporter::new())
        .with_options(options)
        .update_database(&conn)
        .await;

    let err = report.tables[0].result.as_ref().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Timeout);
    assert_eq!(err.table(), Some("dbo.Slow"));
}

// ==================== Fan-out Tests ====================

#[tokio::test]
async fn test_sibling_failures_are_independent() {
    let d = descriptor("Color", &[(1, "Red")]);
    let ok = MockConnection::new("ok").with_table(&d, &[]);
    let broken = MockConnection::new("broken")
        .with_table(&d, &[])
        .fail_on("insert into");
    let factory = Arc::new(
        MockFactory::new()
            .with_database("mock://ok", ok.clone())
            .with_database("mock://broken", broken.clone()),
    );
    let reporter = RecordingReporter::new();

    let reports = replicator(vec![d.clone()], reporter.clone())
        .update_databases(
            Arc::new(SharedFactory(factory)),
            vec![
                ConnectionConfig::new("mock://broken"),
                ConnectionConfig::new("mock://unreachable"),
                ConnectionConfig::new("mock://ok"),
            ],
        )
        .await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].target, "broken");
    let broken_err = reports[0].tables[0].result.as_ref().unwrap_err();
    assert_eq!(broken_err.category(), ErrorCategory::Connection);
    assert_eq!(reports[1].target, "mock://unreachable");
    assert!(reports[1].connect_error.is_some());
    assert!(reports[1].tables.is_empty());
    assert_eq!(reports[2].target, "ok");
    assert!(reports[2].is_success());

    assert_eq!(ok.rows(&d), vec![row(1, "Red")]);
    assert!(ok.is_closed());
    assert!(broken.is_closed());
    assert_eq!(reporter.errors().len(), 2);
}

#[tokio::test]
async fn test_sequential_stops_at_first_failed_database() {
    let d = descriptor("Color", &[(1, "Red")]);
    let broken = MockConnection::new("broken").with_columns(&d, without_description(&d));
    let ok = MockConnection::new("ok").with_table(&d, &[]);
    let factory = Arc::new(
        MockFactory::new()
            .with_database("mock://broken", broken)
            .with_database("mock://ok", ok.clone()),
    );

    let options = SyncOptions {
        parallel: false,
        ..Default::default()
    };
    let reports = replicator(vec![d], RecordingReporter::new())
        .with_options(options)
        .update_databases(
            Arc::new(SharedFactory(factory)),
            vec![
                ConnectionConfig::new("mock://broken"),
                ConnectionConfig::new("mock://ok"),
            ],
        )
        .await;

    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_success());
    assert!(ok.statements().is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let d = descriptor("Color", &[(1, "Red")]);
    let mut factory = MockFactory::new();
    let mut configs = Vec::new();
    for i in 0..6 {
        let url = format!("mock://db{}", i);
        let conn = MockConnection::new(&url)
            .with_table(&d, &[])
            .with_delay(Duration::from_millis(10));
        factory = factory.with_database(&url, conn);
        configs.push(ConnectionConfig::new(url));
    }
    let factory = Arc::new(factory);

    let options = SyncOptions {
        max_concurrency: Some(2),
        ..Default::default()
    };
    let reports = replicator(vec![d], RecordingReporter::new())
        .with_options(options)
        .update_databases(Arc::new(SharedFactory(Arc::clone(&factory))), configs)
        .await;

    assert_eq!(reports.len(), 6);
    assert!(reports.iter().all(|r| r.is_success()));
    assert!(factory.peak_connections() <= 2);
    assert!(factory.peak_connections() >= 1);
}
