//! Paged dump-then-delete of one dependent table for a slice of visits.

use purge_core::limits::dependent_page_size;
use purge_core::{DumpWriter, Filter, MemoryGuard, Page, Query, Result, Statement, Storage};
use telemetry::metrics;
use tracing::debug;

use crate::serializer::DumpSerializer;

/// Rows moved for one table and one identifier slice.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SliceOutcome {
    pub pages: u64,
    pub rows_dumped: u64,
    pub rows_deleted: u64,
}

/// Dumps dependent rows page by page, then deletes them in one statement.
pub struct ChunkedExtractor<'a> {
    storage: &'a dyn Storage,
    guard: &'a dyn MemoryGuard,
    serializer: &'a DumpSerializer,
    page_size: u32,
}

impl<'a> ChunkedExtractor<'a> {
    /// `limit` is the visit limit of the run; the page size derives from it.
    pub fn new(
        storage: &'a dyn Storage,
        guard: &'a dyn MemoryGuard,
        serializer: &'a DumpSerializer,
        limit: u32,
    ) -> Self {
        Self {
            storage,
            guard,
            serializer,
            page_size: dependent_page_size(limit),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Dump every row of `table` whose `column` is in `ids`, then delete them.
    ///
    /// Pages are read in `order_by` order, or by `column` alone when it is
    /// empty. An empty `ids` slice is a no-op: nothing is fetched or deleted.
    pub async fn dump_and_delete(
        &self,
        out: &mut dyn DumpWriter,
        table: &str,
        column: &str,
        ids: &[u64],
        order_by: &[&str],
    ) -> Result<SliceOutcome> {
        let mut outcome = SliceOutcome::default();
        if ids.is_empty() {
            return Ok(outcome);
        }

        let filter = Filter::id_in(column, ids);
        let page_size = u64::from(self.page_size);
        let key_order = [column];
        let order_by = if order_by.is_empty() {
            &key_order[..]
        } else {
            order_by
        };

        loop {
            self.guard.check()?;

            let rows = self
                .storage
                .fetch_all(
                    &Query::select_page(table, filter.clone(), Page::nth(outcome.pages, page_size))
                        .ordered_by(order_by),
                )
                .await?;
            let fetched = rows.len() as u64;

            outcome.rows_dumped += self.serializer.write_rows(out, table, &rows).await?;
            outcome.pages += 1;
            drop(rows);

            if fetched < page_size {
                break;
            }
        }

        outcome.rows_deleted = self
            .storage
            .execute(&Statement::delete(table, filter))
            .await?;
        metrics().rows_deleted.inc_by(outcome.rows_deleted);

        debug!(
            table = table,
            ids = ids.len(),
            pages = outcome.pages,
            dumped = outcome.rows_dumped,
            deleted = outcome.rows_deleted,
            "Dependent slice purged"
        );

        Ok(outcome)
    }
}
