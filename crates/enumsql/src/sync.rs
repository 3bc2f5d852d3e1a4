//! Table and database synchronization
//!
//! - [`sync_table`]: one pass over one table on one connection
//! - [`Replicator`]: every table of a database in sequence, and fan-out
//!   across databases with bounded concurrency
//!
//! Passes never share a connection. Table failures are reported once, carry
//! the table identity, and are exposed per table so callers can decide whether
//! a run succeeded.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::descriptor::EnumDescriptor;
use crate::dialect::{SqlDialect, SqlServerDialect};
use crate::error::{Error, Result};
use crate::executor::execute_plan;
use crate::plan::UpdatePlan;
use crate::report::{database_span, table_span, SyncReporter, TableSummary, TracingReporter};
use crate::schema::{live_columns_from_rows, read_snapshot, reconcile};

/// Synchronize one table: create it if missing, verify its shape, read its
/// rows, and apply the diff.
///
/// Errors are returned unwrapped; callers attach the table identity.
pub async fn sync_table(
    conn: &dyn Connection,
    dialect: &dyn SqlDialect,
    descriptor: &EnumDescriptor,
    reporter: &dyn SyncReporter,
) -> Result<TableSummary> {
    let rows = inspect_table(conn, dialect, descriptor).await?;
    let plan = UpdatePlan::create(descriptor, &rows);
    debug!(
        table = %descriptor.qualified_name(),
        inserts = plan.to_insert.len(),
        updates = plan.to_update.len(),
        removals = plan.to_remove.len(),
        "Planned table update"
    );
    execute_plan(conn, dialect, descriptor, &plan, reporter).await
}

/// Create the table if missing, reconcile its shape, and read its rows
pub async fn inspect_table(
    conn: &dyn Connection,
    dialect: &dyn SqlDialect,
    descriptor: &EnumDescriptor,
) -> Result<Vec<crate::descriptor::TableRow>> {
    let sql = dialect.prepare_table_sql(descriptor);
    let results = conn.query_multiple(&sql, &[]).await?;

    // the guarded create produces no result set; metadata and rows are last
    let [.., columns, rows] = results.as_slice() else {
        return Err(Error::query_with_sql(
            format!(
                "expected column metadata and rows for {}, got {} result set(s)",
                descriptor.qualified_name(),
                results.len()
            ),
            sql,
        ));
    };

    let live = live_columns_from_rows(columns)?;
    let map = reconcile(descriptor, &live)?;
    read_snapshot(descriptor, &map, rows)
}

/// Run options for a [`Replicator`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Process databases concurrently
    pub parallel: bool,
    /// Upper bound on concurrent databases; `None` uses available parallelism
    pub max_concurrency: Option<usize>,
    /// Keep going with the next table after a table fails
    pub continue_on_table_error: bool,
    /// Deadline for one whole table pass
    pub table_timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_concurrency: None,
            continue_on_table_error: false,
            table_timeout: None,
        }
    }
}

impl SyncOptions {
    fn concurrency(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }
}

/// Result of one table pass
#[derive(Debug)]
pub struct TableReport {
    /// `schema.table`
    pub table: String,
    /// Enum the table replicates
    pub enum_name: String,
    /// Row outcome counts, or the table's failure
    pub result: Result<TableSummary>,
}

/// Result of one database pass
#[derive(Debug)]
pub struct DatabaseReport {
    /// Target as shown in logs (password redacted)
    pub target: String,
    /// Failure to open the connection; no tables ran
    pub connect_error: Option<Error>,
    /// Tables processed, in descriptor order
    pub tables: Vec<TableReport>,
}

impl DatabaseReport {
    fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            connect_error: None,
            tables: Vec::new(),
        }
    }

    /// Whether the connection opened and every table succeeded
    pub fn is_success(&self) -> bool {
        self.connect_error.is_none() && self.tables.iter().all(|t| t.result.is_ok())
    }

    /// Every failure of this database pass
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.connect_error
            .iter()
            .chain(self.tables.iter().filter_map(|t| t.result.as_ref().err()))
    }

    /// Sum of all successful table summaries
    pub fn totals(&self) -> TableSummary {
        self.tables
            .iter()
            .filter_map(|t| t.result.as_ref().ok())
            .fold(TableSummary::default(), |mut acc, s| {
                acc.inserted += s.inserted;
                acc.updated += s.updated;
                acc.deleted += s.deleted;
                acc.deactivated += s.deactivated;
                acc.skipped += s.skipped;
                acc
            })
    }
}

/// Replicates a set of enum descriptors into one or more databases
#[derive(Clone)]
pub struct Replicator {
    descriptors: Arc<[EnumDescriptor]>,
    dialect: Arc<dyn SqlDialect>,
    reporter: Arc<dyn SyncReporter>,
    options: SyncOptions,
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("tables", &self.descriptors.len())
            .field("dialect", &self.dialect.name())
            .field("options", &self.options)
            .finish()
    }
}

impl Replicator {
    /// Replicator for SQL Server, reporting through `tracing`
    pub fn new(descriptors: Vec<EnumDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into(),
            dialect: Arc::new(SqlServerDialect),
            reporter: Arc::new(TracingReporter),
            options: SyncOptions::default(),
        }
    }

    /// Set the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn SyncReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Set the dialect
    pub fn with_dialect(mut self, dialect: Arc<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set run options
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Descriptors in processing order
    pub fn descriptors(&self) -> &[EnumDescriptor] {
        &self.descriptors
    }

    /// Run options
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    async fn run_table(&self, conn: &dyn Connection, descriptor: &EnumDescriptor) -> TableReport {
        let table = descriptor.qualified_name();
        let pass = sync_table(conn, self.dialect.as_ref(), descriptor, self.reporter.as_ref());

        let result = match self.options.table_timeout {
            Some(limit) => match tokio::time::timeout(limit, pass).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "table pass did not finish within {:?}",
                    limit
                ))),
            },
            None => pass.await,
        }
        .map_err(|e| e.in_table(table.clone()));

        if let Err(e) = &result {
            self.reporter.error(&table, e);
        }

        TableReport {
            table,
            enum_name: descriptor.enum_name().to_string(),
            result,
        }
    }

    /// Synchronize every table, in order, on one connection
    pub async fn update_database(&self, conn: &dyn Connection) -> DatabaseReport {
        let mut report = DatabaseReport::new(conn.target());
        info!("Updating database {}", report.target);

        for descriptor in self.descriptors.iter() {
            let span = table_span(&descriptor.qualified_name(), descriptor.enum_name());
            let table = self.run_table(conn, descriptor).instrument(span).await;
            let failed = table.result.is_err();
            report.tables.push(table);

            if failed && !self.options.continue_on_table_error {
                warn!(
                    "Stopping {} after a table failure; {} table(s) not processed",
                    report.target,
                    self.descriptors.len() - report.tables.len()
                );
                break;
            }
        }

        report
    }

    async fn connect_and_update(
        &self,
        factory: &dyn ConnectionFactory,
        config: &ConnectionConfig,
    ) -> DatabaseReport {
        let conn = match factory.connect(config).await {
            Ok(conn) => conn,
            Err(e) => {
                let mut report = DatabaseReport::new(config.redacted_url());
                self.reporter.error(&report.target, &e);
                report.connect_error = Some(e);
                return report;
            }
        };

        let report = self.update_database(conn.as_ref()).await;
        if let Err(e) = conn.close().await {
            debug!("Failed to close connection to {}: {}", report.target, e);
        }
        report
    }

    /// Synchronize several databases.
    ///
    /// In parallel mode every database is processed regardless of sibling
    /// failures, at most `concurrency` at a time. Otherwise databases run in
    /// order and the run stops at the first database that fails.
    /// Reports are returned in input order.
    pub async fn update_databases(
        &self,
        factory: Arc<dyn ConnectionFactory>,
        configs: Vec<ConnectionConfig>,
    ) -> Vec<DatabaseReport> {
        if !self.options.parallel || configs.len() <= 1 {
            let mut reports = Vec::with_capacity(configs.len());
            for config in &configs {
                let span = database_span(&config.redacted_url());
                let report = self
                    .connect_and_update(factory.as_ref(), config)
                    .instrument(span)
                    .await;
                let failed = !report.is_success();
                reports.push(report);
                if failed {
                    break;
                }
            }
            return reports;
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency()));
        let mut tasks = Vec::with_capacity(configs.len());

        for config in configs {
            let replicator = self.clone();
            let factory = Arc::clone(&factory);
            let semaphore = Arc::clone(&semaphore);
            let target = config.redacted_url();
            let span = database_span(&target);

            let handle = tokio::spawn(
                async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            let mut report = DatabaseReport::new(config.redacted_url());
                            report.connect_error = Some(Error::internal("run was shut down"));
                            return report;
                        }
                    };
                    replicator
                        .connect_and_update(factory.as_ref(), &config)
                        .await
                }
                .instrument(span),
            );
            tasks.push((target, handle));
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for (target, handle) in tasks {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let mut report = DatabaseReport::new(target);
                    report.connect_error =
                        Some(Error::internal(format!("database task failed: {}", e)));
                    reports.push(report);
                }
            }
        }
        reports
    }
}
