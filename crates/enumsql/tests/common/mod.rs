//! Shared test doubles: an in-memory SQL Server stand-in, a connection
//! factory over it, and a reporter that records every event.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use enumsql::connection::{Connection, ConnectionConfig, ConnectionFactory};
use enumsql::descriptor::{
    BackingType, ColumnRole, ColumnSize, EnumDescriptor, EnumMember, TableConfig, TableRow,
};
use enumsql::dialect::{SqlDialect, SqlServerDialect};
use enumsql::error::{Error, Result, SQLSERVER_CONSTRAINT_CONFLICT};
use enumsql::report::{RowOutcome, SyncReporter, TableSummary};
use enumsql::schema::LiveColumn;
use enumsql::types::{Row, Value};

// ==================== Builders ====================

pub fn row(id: i64, name: &str) -> TableRow {
    TableRow {
        id,
        name: name.into(),
        display_name: name.into(),
        description: String::new(),
        is_active: true,
    }
}

pub fn inactive(mut row: TableRow) -> TableRow {
    row.is_active = false;
    row
}

pub fn descriptor(table: &str, members: &[(i64, &str)]) -> EnumDescriptor {
    descriptor_with(TableConfig::new(table), members)
}

pub fn descriptor_with(config: TableConfig, members: &[(i64, &str)]) -> EnumDescriptor {
    let members: Vec<EnumMember> = members
        .iter()
        .map(|(id, name)| EnumMember::new(*id, *name))
        .collect();
    EnumDescriptor::new(config.table.clone(), BackingType::I32, &config, &members)
        .expect("valid descriptor")
}

// ==================== Mock database ====================

struct MockTable {
    descriptor: EnumDescriptor,
    columns: Option<Vec<LiveColumn>>,
    rows: BTreeMap<i64, TableRow>,
    fk_protected: HashSet<i64>,
}

#[derive(Default)]
struct MockState {
    tables: HashMap<String, MockTable>,
    statements: Vec<(String, Vec<Value>)>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    closed: bool,
}

/// In-memory stand-in for one SQL Server database.
///
/// Understands exactly the statements [`SqlServerDialect`] generates. Cloning
/// yields another handle to the same database.
#[derive(Clone, Default)]
pub struct MockConnection {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    /// Register a table that does not exist yet
    pub fn with_missing_table(self, descriptor: &EnumDescriptor) -> Self {
        self.insert_table(descriptor, None, &[])
    }

    /// Register an existing table with the descriptor's shape
    pub fn with_table(self, descriptor: &EnumDescriptor, rows: &[TableRow]) -> Self {
        let columns = descriptor
            .columns()
            .iter()
            .map(LiveColumn::from_descriptor)
            .collect();
        self.insert_table(descriptor, Some(columns), rows)
    }

    /// Register an existing table with an arbitrary shape
    pub fn with_columns(self, descriptor: &EnumDescriptor, columns: Vec<LiveColumn>) -> Self {
        self.insert_table(descriptor, Some(columns), &[])
    }

    fn insert_table(
        self,
        descriptor: &EnumDescriptor,
        columns: Option<Vec<LiveColumn>>,
        rows: &[TableRow],
    ) -> Self {
        self.state.lock().unwrap().tables.insert(
            descriptor.sql_table(),
            MockTable {
                descriptor: descriptor.clone(),
                columns,
                rows: rows.iter().map(|r| (r.id, r.clone())).collect(),
                fk_protected: HashSet::new(),
            },
        );
        self
    }

    /// Deletes of this identity fail with error 547
    pub fn protect(self, descriptor: &EnumDescriptor, id: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .get_mut(&descriptor.sql_table())
            .expect("registered table")
            .fk_protected
            .insert(id);
        self
    }

    /// Statements containing `needle` fail with a transport error
    pub fn fail_on(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_on.push(needle.to_string());
        self
    }

    /// Every round trip takes this long
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .statements
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn statements_with_params(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Statements other than the preparation batch
    pub fn writes(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| !s.contains("INFORMATION_SCHEMA"))
            .collect()
    }

    pub fn rows(&self, descriptor: &EnumDescriptor) -> Vec<TableRow> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&descriptor.sql_table())
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn table_exists(&self, descriptor: &EnumDescriptor) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&descriptor.sql_table())
            .is_some_and(|t| t.columns.is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    async fn round_trip(&self, sql: &str, params: &[Value]) -> Result<()> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.statements.push((sql.to_string(), params.to_vec()));
            if state.fail_on.iter().any(|n| sql.contains(n.as_str())) {
                return Err(Error::connection("connection reset by peer"));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn table_key<'a>(tables: &'a mut HashMap<String, MockTable>, sql: &str) -> Result<&'a mut MockTable> {
    tables
        .iter_mut()
        .find(|(key, _)| sql.contains(key.as_str()))
        .map(|(_, t)| t)
        .ok_or_else(|| Error::query_with_sql("Invalid object name", sql))
}

fn id_value(descriptor: &EnumDescriptor, id: i64) -> Value {
    match descriptor.columns().id.size {
        ColumnSize::Bytes(1) => Value::UInt8(id as u8),
        ColumnSize::Bytes(2) => Value::Int16(id as i16),
        ColumnSize::Bytes(4) => Value::Int32(id as i32),
        _ => Value::Int64(id),
    }
}

fn metadata_row(column: &LiveColumn) -> Row {
    Row::new(
        vec![
            "COLUMN_NAME".into(),
            "DATA_TYPE".into(),
            "CHARACTER_MAXIMUM_LENGTH".into(),
            "IS_NULLABLE".into(),
            "IS_IDENTITY".into(),
        ],
        vec![
            Value::from(column.name.as_str()),
            Value::from(column.data_type.as_str()),
            Value::Int32(column.max_length),
            Value::Bool(column.nullable),
            Value::Bool(column.identity),
        ],
    )
}

fn data_row(table: &MockTable, row: &TableRow) -> Row {
    let columns = table.columns.as_deref().unwrap_or_default();
    let by_role = |name: &str| {
        table
            .descriptor
            .columns()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.role)
    };

    let values = columns
        .iter()
        .map(|c| match by_role(&c.name) {
            Some(ColumnRole::Id) => id_value(&table.descriptor, row.id),
            Some(ColumnRole::Name) => Value::from(row.name.as_str()),
            Some(ColumnRole::DisplayName) => Value::from(row.display_name.as_str()),
            Some(ColumnRole::Description) => Value::from(row.description.as_str()),
            Some(ColumnRole::IsActive) => Value::Bool(row.is_active),
            None => Value::Null,
        })
        .collect();

    Row::new(columns.iter().map(|c| c.name.clone()).collect(), values)
}

/// Rebuild a row from bound parameters in the given role order
fn apply_params(
    target: &mut TableRow,
    roles: impl Iterator<Item = ColumnRole>,
    params: &[Value],
) {
    for (role, value) in roles.zip(params) {
        match role {
            ColumnRole::Id => target.id = value.as_i64().unwrap_or_default(),
            ColumnRole::Name => target.name = value.as_str().unwrap_or_default().to_string(),
            ColumnRole::DisplayName => {
                target.display_name = value.as_str().unwrap_or_default().to_string()
            }
            ColumnRole::Description => {
                target.description = value.as_str().unwrap_or_default().to_string()
            }
            ColumnRole::IsActive => target.is_active = value.as_bool().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query_multiple(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Row>>> {
        self.round_trip(sql, params).await?;

        let mut state = self.state.lock().unwrap();
        let table = table_key(&mut state.tables, sql)?;

        if table.columns.is_none() && sql.contains("create table") {
            table.columns = Some(
                table
                    .descriptor
                    .columns()
                    .iter()
                    .map(LiveColumn::from_descriptor)
                    .collect(),
            );
        }

        let table: &MockTable = table;
        let metadata: Vec<Row> = table
            .columns
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(metadata_row)
            .collect();
        let rows: Vec<Row> = table.rows.values().map(|r| data_row(table, r)).collect();
        Ok(vec![metadata, rows])
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.round_trip(sql, params).await?;

        let mut state = self.state.lock().unwrap();
        let table = table_key(&mut state.tables, sql)?;
        let id_param = |idx: usize| {
            params
                .get(idx)
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::query_with_sql("missing Id parameter", sql))
        };

        if sql.starts_with("insert into") {
            let mut new_row = row(0, "");
            let roles: Vec<ColumnRole> = table.descriptor.columns().iter().map(|c| c.role).collect();
            apply_params(&mut new_row, roles.into_iter(), params);
            if table.rows.contains_key(&new_row.id) {
                return Err(Error::query_with_sql("Violation of PRIMARY KEY constraint", sql));
            }
            table.rows.insert(new_row.id, new_row);
            Ok(1)
        } else if sql.starts_with("delete from") {
            let id = id_param(0)?;
            if table.fk_protected.contains(&id) {
                return Err(Error::foreign_key(
                    SQLSERVER_CONSTRAINT_CONFLICT,
                    "The DELETE statement conflicted with the REFERENCE constraint",
                ));
            }
            Ok(u64::from(table.rows.remove(&id).is_some()))
        } else if sql.starts_with("update") && sql.contains("= 0 where") {
            let id = id_param(0)?;
            Ok(match table.rows.get_mut(&id) {
                Some(r) => {
                    r.is_active = false;
                    1
                }
                None => 0,
            })
        } else if sql.starts_with("update") {
            let roles: Vec<ColumnRole> = table.descriptor.columns().non_id().map(|c| c.role).collect();
            let id = id_param(roles.len())?;
            Ok(match table.rows.get_mut(&id) {
                Some(r) => {
                    apply_params(r, roles.into_iter(), params);
                    1
                }
                None => 0,
            })
        } else {
            Err(Error::query_with_sql("unsupported statement", sql))
        }
    }

    fn target(&self) -> String {
        self.name.clone()
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

// ==================== Mock factory ====================

/// Hands out [`MockConnection`]s by URL; unknown URLs fail to connect
#[derive(Default)]
pub struct MockFactory {
    databases: HashMap<String, MockConnection>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, url: &str, conn: MockConnection) -> Self {
        self.databases.insert(url.to_string(), conn);
        self
    }

    /// Highest number of connections open at the same time
    pub fn peak_connections(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct TrackedConnection {
    inner: MockConnection,
    factory: Arc<MockFactory>,
}

#[async_trait]
impl Connection for TrackedConnection {
    async fn query_multiple(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Row>>> {
        self.inner.query_multiple(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.inner.execute(sql, params).await
    }

    fn target(&self) -> String {
        self.inner.target()
    }

    async fn close(&self) -> Result<()> {
        self.factory.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Factory handle that counts concurrently open connections
#[derive(Clone)]
pub struct SharedFactory(pub Arc<MockFactory>);

#[async_trait]
impl ConnectionFactory for SharedFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let conn = self
            .0
            .databases
            .get(&config.url)
            .cloned()
            .ok_or_else(|| Error::connection(format!("cannot reach {}", config.url)))?;

        let now = self.0.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(TrackedConnection {
            inner: conn,
            factory: Arc::clone(&self.0),
        }))
    }
}

// ==================== Recording reporter ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin(String),
    Row(RowOutcome),
    End(String, TableSummary),
    Error(String, String),
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<RowOutcome> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Row(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(table, message) => Some((table, message)),
                _ => None,
            })
            .collect()
    }
}

impl SyncReporter for RecordingReporter {
    fn begin_table(&self, table: &str) {
        self.events.lock().unwrap().push(Event::Begin(table.to_string()));
    }

    fn row_outcome(&self, outcome: &RowOutcome) {
        self.events.lock().unwrap().push(Event::Row(outcome.clone()));
    }

    fn end_table(&self, table: &str, summary: &TableSummary) {
        self.events
            .lock()
            .unwrap()
            .push(Event::End(table.to_string(), *summary));
    }

    fn error(&self, table: &str, error: &Error) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Error(table.to_string(), error.to_string()));
    }
}

pub fn dialect() -> SqlServerDialect {
    SqlServerDialect
}

pub fn dialect_ref() -> &'static dyn SqlDialect {
    &SqlServerDialect
}
