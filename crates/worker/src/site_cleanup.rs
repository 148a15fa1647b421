//! Site-purge mode: removal of archives and site configuration once all
//! visits of the site are gone.
//!
//! Tables are dumped in one fetch each. Per-site archive and configuration
//! tables are small compared to the logs, so they are not paged.

use purge_core::{
    ArchivePattern, DumpWriter, Filter, MemoryGuard, Query, Result, Statement, Storage,
    TableResolver, SITE_AUX_TABLES,
};
use telemetry::metrics;
use tracing::{debug, info};

use crate::serializer::DumpSerializer;

/// Physical names of every archive table currently in the database.
pub async fn archive_tables(storage: &dyn Storage, pattern: &ArchivePattern) -> Result<Vec<String>> {
    let rows = storage.fetch_all(&Query::ShowTables).await?;
    let names: Vec<String> = rows
        .iter()
        .filter_map(|row| match row.iter().last() {
            Some((_, purge_core::Value::Text(name))) => Some(name.clone()),
            Some((_, purge_core::Value::Bytes(raw))) => String::from_utf8(raw.clone()).ok(),
            _ => None,
        })
        .collect();

    Ok(pattern.filter(names.iter().map(String::as_str)))
}

/// Dumps and deletes every row owned by one site outside the visit log.
pub struct SiteScopeCleanup<'a> {
    storage: &'a dyn Storage,
    guard: &'a dyn MemoryGuard,
    resolver: &'a dyn TableResolver,
    pattern: &'a ArchivePattern,
    serializer: &'a DumpSerializer,
    site_id: u32,
}

impl<'a> SiteScopeCleanup<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        guard: &'a dyn MemoryGuard,
        resolver: &'a dyn TableResolver,
        pattern: &'a ArchivePattern,
        serializer: &'a DumpSerializer,
        site_id: u32,
    ) -> Self {
        Self {
            storage,
            guard,
            resolver,
            pattern,
            serializer,
            site_id,
        }
    }

    /// Archive tables first, then goal, site_url, access and site.
    pub async fn tables(&self) -> Result<Vec<String>> {
        let mut tables = archive_tables(self.storage, self.pattern).await?;
        tables.extend(SITE_AUX_TABLES.iter().map(|t| self.resolver.resolve(t)));
        Ok(tables)
    }

    /// Rows of the site still present in the cleaned tables.
    pub async fn remaining(&self) -> Result<u64> {
        let filter = Filter::Site(self.site_id);
        let mut remaining = 0;
        for table in self.tables().await? {
            let count = self
                .storage
                .fetch_one(&Query::count(&table, filter.clone()))
                .await?;
            remaining += count.and_then(|v| v.as_u64()).unwrap_or(0);
        }
        Ok(remaining)
    }

    /// Always returns 0: the site is finished once this completes.
    pub async fn run(&self, out: &mut dyn DumpWriter) -> Result<u64> {
        let tables = self.tables().await?;
        let filter = Filter::Site(self.site_id);

        let mut dumped = 0;
        for table in &tables {
            self.guard.check()?;

            let rows = self
                .storage
                .fetch_all(&Query::select(table, filter.clone()))
                .await?;
            let written = self.serializer.write_rows(out, table, &rows).await?;
            drop(rows);

            let deleted = self
                .storage
                .execute(&Statement::delete(table, filter.clone()))
                .await?;
            metrics().rows_deleted.inc_by(deleted);
            metrics().site_tables_cleaned.inc();
            dumped += written;

            debug!(table = %table, dumped = written, deleted = deleted, "Site table purged");
        }

        info!(
            site_id = self.site_id,
            tables = tables.len(),
            rows = dumped,
            "Site cleanup complete"
        );
        Ok(0)
    }
}
