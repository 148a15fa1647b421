//! Logical table names and physical name resolution.

use regex::Regex;

use crate::error::{Error, Result};

pub const LOG_VISIT: &str = "log_visit";
pub const LOG_LINK_VISIT_ACTION: &str = "log_link_visit_action";
pub const LOG_CONVERSION: &str = "log_conversion";
pub const LOG_CONVERSION_ITEM: &str = "log_conversion_item";
pub const GOAL: &str = "goal";
pub const SITE_URL: &str = "site_url";
pub const ACCESS: &str = "access";
pub const SITE: &str = "site";

/// Identifier shared by a visit and its dependent rows.
pub const VISIT_ID_COLUMN: &str = "idvisit";

/// Archive tables start with this (after the prefix).
pub const ARCHIVE_PREFIX: &str = "archive_";

/// A table whose rows hang off a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependentTable {
    pub name: &'static str,
    pub key_column: &'static str,
    /// Primary key, leading with `key_column`. Pages are read in this order.
    pub order_by: &'static [&'static str],
}

/// Dependents of `log_visit`, in processing order.
pub const DEPENDENT_TABLES: [DependentTable; 3] = [
    DependentTable {
        name: LOG_LINK_VISIT_ACTION,
        key_column: VISIT_ID_COLUMN,
        order_by: &[VISIT_ID_COLUMN, "idlink_va"],
    },
    DependentTable {
        name: LOG_CONVERSION,
        key_column: VISIT_ID_COLUMN,
        order_by: &[VISIT_ID_COLUMN, "idgoal", "buster"],
    },
    DependentTable {
        name: LOG_CONVERSION_ITEM,
        key_column: VISIT_ID_COLUMN,
        order_by: &[VISIT_ID_COLUMN, "idorder", "idaction_sku"],
    },
];

/// Site-owned configuration tables removed in site-purge mode.
pub const SITE_AUX_TABLES: [&str; 4] = [GOAL, SITE_URL, ACCESS, SITE];

/// Log tables, in the order they are listed for maintenance.
pub const LOG_TABLES: [&str; 4] = [
    LOG_CONVERSION,
    LOG_CONVERSION_ITEM,
    LOG_VISIT,
    LOG_LINK_VISIT_ACTION,
];

/// Maps a logical table name to the physical one.
pub trait TableResolver: Send + Sync {
    fn resolve(&self, logical: &str) -> String;
}

/// Resolver that prepends a fixed prefix, e.g. `piwik_`.
#[derive(Debug, Clone, Default)]
pub struct PrefixResolver {
    prefix: String,
}

impl PrefixResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl TableResolver for PrefixResolver {
    fn resolve(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }
}

/// Recognizes archive tables among the names returned by `SHOW TABLES`.
#[derive(Debug, Clone)]
pub struct ArchivePattern {
    regex: Regex,
}

impl ArchivePattern {
    /// Pattern anchored on the resolved archive prefix.
    pub fn for_resolver(resolver: &dyn TableResolver) -> Result<Self> {
        let prefix = resolver.resolve(ARCHIVE_PREFIX);
        let regex = Regex::new(&format!("^{}", regex::escape(&prefix)))
            .map_err(|e| Error::internal(format!("archive pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, table: &str) -> bool {
        self.regex.is_match(table)
    }

    /// Keep the archive tables of `tables`, preserving order.
    pub fn filter<'a>(&self, tables: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        tables
            .into_iter()
            .filter(|t| self.matches(t))
            .map(str::to_string)
            .collect()
    }
}
