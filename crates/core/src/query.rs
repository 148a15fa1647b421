//! Structured queries and statements issued against the log store.
//!
//! Storage backends either render them to SQL (`to_sql`) or evaluate them
//! directly, so the WHERE text for a count and for the matching fetch is
//! always produced by the same code.
//!
//! Paged selects carry an ORDER BY on a unique key. Without it MySQL may
//! return rows in a different order for each LIMIT window, and a row missed
//! by every page would still be removed by the delete that follows.

use crate::codec::quote_identifier;
use crate::selection::Filter;

/// A `LIMIT offset, count` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub count: u64,
}

impl Page {
    pub fn first(count: u64) -> Self {
        Self { offset: 0, count }
    }

    /// Page `index` (zero based) of `size` rows.
    pub fn nth(index: u64, size: u64) -> Self {
        Self {
            offset: index * size,
            count: size,
        }
    }
}

/// Read-only requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Select {
        table: String,
        filter: Option<Filter>,
        order_by: Vec<String>,
        page: Option<Page>,
    },
    Count {
        table: String,
        filter: Filter,
    },
    ShowTables,
}

impl Query {
    pub fn select(table: impl Into<String>, filter: Filter) -> Self {
        Self::Select {
            table: table.into(),
            filter: Some(filter),
            order_by: Vec::new(),
            page: None,
        }
    }

    pub fn select_page(table: impl Into<String>, filter: Filter, page: Page) -> Self {
        Self::Select {
            table: table.into(),
            filter: Some(filter),
            order_by: Vec::new(),
            page: Some(page),
        }
    }

    /// Order a select by `columns`. Other queries are returned unchanged.
    pub fn ordered_by(mut self, columns: &[&str]) -> Self {
        if let Self::Select { order_by, .. } = &mut self {
            *order_by = columns.iter().map(|c| c.to_string()).collect();
        }
        self
    }

    pub fn count(table: impl Into<String>, filter: Filter) -> Self {
        Self::Count {
            table: table.into(),
            filter,
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Self::Select {
                table,
                filter,
                order_by,
                page,
            } => {
                let mut sql = format!("SELECT * FROM {}", quote_identifier(table));
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(&filter.to_sql());
                }
                if !order_by.is_empty() {
                    let columns: Vec<String> =
                        order_by.iter().map(|c| quote_identifier(c)).collect();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&columns.join(", "));
                }
                if let Some(page) = page {
                    sql.push_str(&format!(" LIMIT {}, {}", page.offset, page.count));
                }
                sql
            }
            Self::Count { table, filter } => format!(
                "SELECT count(*) AS cnt FROM {} WHERE {}",
                quote_identifier(table),
                filter.to_sql()
            ),
            Self::ShowTables => "SHOW TABLES".to_string(),
        }
    }
}

/// Mutating requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Delete { table: String, filter: Filter },
    Optimize { table: String },
}

impl Statement {
    pub fn delete(table: impl Into<String>, filter: Filter) -> Self {
        Self::Delete {
            table: table.into(),
            filter,
        }
    }

    pub fn optimize(table: impl Into<String>) -> Self {
        Self::Optimize {
            table: table.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Self::Delete { table, filter } => format!(
                "DELETE FROM {} WHERE {}",
                quote_identifier(table),
                filter.to_sql()
            ),
            Self::Optimize { table } => format!("OPTIMIZE TABLE {}", quote_identifier(table)),
        }
    }
}
