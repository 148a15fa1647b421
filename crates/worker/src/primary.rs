//! One bounded pass over the visit log and its dependent tables.

use purge_core::limits::{DELETE_SLICE_SIZE, DEPENDENT_SLICE_SIZE};
use purge_core::{
    DumpWriter, Error, Filter, MemoryGuard, Page, Query, Result, Row, Statement, Storage,
    TableResolver, DEPENDENT_TABLES, LOG_VISIT, VISIT_ID_COLUMN,
};
use telemetry::metrics;
use tracing::{debug, info};

use crate::extractor::ChunkedExtractor;
use crate::serializer::DumpSerializer;

/// Dumps and deletes up to `limit` visits matching `filter`, dependents first.
pub struct PrimaryLogExtractor<'a> {
    storage: &'a dyn Storage,
    guard: &'a dyn MemoryGuard,
    resolver: &'a dyn TableResolver,
    serializer: &'a DumpSerializer,
    filter: &'a Filter,
    limit: u32,
}

impl<'a> PrimaryLogExtractor<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        guard: &'a dyn MemoryGuard,
        resolver: &'a dyn TableResolver,
        serializer: &'a DumpSerializer,
        filter: &'a Filter,
        limit: u32,
    ) -> Self {
        Self {
            storage,
            guard,
            resolver,
            serializer,
            filter,
            limit,
        }
    }

    /// Run one pass. Returns the number of visits processed; 0 means nothing
    /// matched and the phase is exhausted.
    pub async fn run(&self, out: &mut dyn DumpWriter) -> Result<u64> {
        let visit_table = self.resolver.resolve(LOG_VISIT);

        let visits = self
            .storage
            .fetch_all(
                &Query::select_page(
                    &visit_table,
                    self.filter.clone(),
                    Page::first(u64::from(self.limit)),
                )
                .ordered_by(&[VISIT_ID_COLUMN]),
            )
            .await?;
        if visits.is_empty() {
            debug!(table = %visit_table, filter = %self.filter, "No visits left");
            return Ok(0);
        }

        let ids = visit_ids(&visits)?;

        let extractor = ChunkedExtractor::new(self.storage, self.guard, self.serializer, self.limit);
        for slice in ids.chunks(DEPENDENT_SLICE_SIZE) {
            for dependent in DEPENDENT_TABLES {
                let table = self.resolver.resolve(dependent.name);
                extractor
                    .dump_and_delete(out, &table, dependent.key_column, slice, dependent.order_by)
                    .await?;
                self.guard.check()?;
            }
        }

        self.serializer.write_rows(out, &visit_table, &visits).await?;
        drop(visits);

        let mut deleted = 0;
        for slice in ids.chunks(DELETE_SLICE_SIZE) {
            deleted += self
                .storage
                .execute(&Statement::delete(
                    &visit_table,
                    Filter::id_in(VISIT_ID_COLUMN, slice),
                ))
                .await?;
        }
        metrics().rows_deleted.inc_by(deleted);

        let processed = ids.len() as u64;
        metrics().visits_processed.inc_by(processed);
        info!(
            table = %visit_table,
            visits = processed,
            deleted = deleted,
            "Visit pass complete"
        );

        Ok(processed)
    }
}

fn visit_ids(visits: &[Row]) -> Result<Vec<u64>> {
    visits
        .iter()
        .map(|row| {
            row.get(VISIT_ID_COLUMN)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::internal(format!("visit row without {}", VISIT_ID_COLUMN)))
        })
        .collect()
}
