//! Storage seam and an in-process implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result, StorageErrorCode};
use crate::query::{Query, Statement};
use crate::value::{Row, Value};

/// The relational store holding the logs.
///
/// Calls are awaited one at a time by the pipeline; implementations do not
/// need to support concurrent use within a run.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run a query and return every row.
    async fn fetch_all(&self, query: &Query) -> Result<Vec<Row>>;

    /// Run a query and return the first column of the first row.
    async fn fetch_one(&self, query: &Query) -> Result<Option<Value>>;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Called at the start of a pass once the connection is older than the
    /// configured threshold.
    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Column name used for `SHOW TABLES` results.
pub const SHOW_TABLES_COLUMN: &str = "Tables_in_database";

/// Tables held in memory. Evaluates filters directly instead of parsing SQL,
/// and keeps a journal of the SQL it would have run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    journal: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, name: impl Into<String>) {
        self.tables.lock().insert(name.into(), Vec::new());
    }

    pub fn insert(&self, table: &str, row: Row) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn insert_many(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, Vec::len)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().keys().cloned().collect()
    }

    /// SQL text of every call so far, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    fn record(&self, sql: String) {
        self.journal.lock().push(sql);
    }

    fn missing(table: &str, code: StorageErrorCode) -> Error {
        Error::storage(code, format!("Table '{}' doesn't exist", table))
    }
}

/// Integer keys only; the log tables are ordered by their numeric ids.
fn sort_key(row: &Row, columns: &[String]) -> Vec<Option<u64>> {
    columns
        .iter()
        .map(|c| row.get(c).and_then(|v| v.as_u64()))
        .collect()
}

#[async_trait]
impl Storage for MemoryStore {
    async fn fetch_all(&self, query: &Query) -> Result<Vec<Row>> {
        self.record(query.to_sql());
        let tables = self.tables.lock();

        match query {
            Query::Select {
                table,
                filter,
                order_by,
                page,
            } => {
                let rows = tables
                    .get(table)
                    .ok_or_else(|| Self::missing(table, StorageErrorCode::FetchFailed))?;
                let mut matching: Vec<&Row> = rows
                    .iter()
                    .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
                    .collect();
                if !order_by.is_empty() {
                    matching.sort_by_key(|row| sort_key(row, order_by));
                }
                let selected = match page {
                    Some(page) => matching
                        .into_iter()
                        .skip(page.offset as usize)
                        .take(page.count as usize)
                        .cloned()
                        .collect(),
                    None => matching.into_iter().cloned().collect(),
                };
                Ok(selected)
            }
            Query::Count { table, filter } => {
                let rows = tables
                    .get(table)
                    .ok_or_else(|| Self::missing(table, StorageErrorCode::FetchFailed))?;
                let count = rows.iter().filter(|row| filter.matches(row)).count();
                Ok(vec![Row::new().with("cnt", count as u64)])
            }
            Query::ShowTables => Ok(tables
                .keys()
                .map(|name| Row::new().with(SHOW_TABLES_COLUMN, name.as_str()))
                .collect()),
        }
    }

    async fn fetch_one(&self, query: &Query) -> Result<Option<Value>> {
        let rows = self.fetch_all(query).await?;
        Ok(rows.into_iter().next().and_then(Row::into_first))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.record(statement.to_sql());
        let mut tables = self.tables.lock();

        match statement {
            Statement::Delete { table, filter } => {
                let rows = tables
                    .get_mut(table)
                    .ok_or_else(|| Self::missing(table, StorageErrorCode::ExecuteFailed))?;
                let before = rows.len();
                rows.retain(|row| !filter.matches(row));
                Ok((before - rows.len()) as u64)
            }
            Statement::Optimize { table } => {
                if !tables.contains_key(table) {
                    return Err(Self::missing(table, StorageErrorCode::ExecuteFailed));
                }
                Ok(0)
            }
        }
    }
}
