//! Dump dialects and the run controller.
//!
//! A dialect owns the dump framing and drives one invocation:
//!
//! ```text
//! PRIMARY_EXTRACTION --(n > 0)--------------------> return n, call again later
//! PRIMARY_EXTRACTION --(0, no site scope)---------> DONE
//! PRIMARY_EXTRACTION --(0, site scope)--> SITE_CLEANUP --> DONE
//! ```
//!
//! Every invocation starts at PRIMARY_EXTRACTION; progress between
//! invocations comes only from the rows already deleted.
//!
//! A retention age is resolved into a cutoff on first use and again on each
//! `refresh_cutoff`. Counts and invocations in between share one predicate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use parking_lot::Mutex;
use purge_core::{
    ArchivePattern, Clock, DumpWriter, Filter, MemoryGuard, Query, Result, Row, RunConfig,
    Statement, Storage, SystemClock, TableResolver, Unlimited, LOG_TABLES, LOG_VISIT,
    SITE_AUX_TABLES,
};
use telemetry::metrics;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::primary::PrimaryLogExtractor;
use crate::serializer::{DumpSerializer, ToolInfo};
use crate::site_cleanup::{archive_tables, SiteScopeCleanup};

/// Default connection age after which the store is asked to reconnect.
pub const DEFAULT_RECONNECT_AFTER_SECS: i64 = 300;

/// A dump target format plus the extraction that feeds it.
#[async_trait]
pub trait Dialect: Send + Sync {
    /// Header, once per dump file.
    async fn write_preamble(&self, out: &mut dyn DumpWriter) -> Result<()>;

    /// Footer, once per dump file.
    async fn write_appendix(&self, out: &mut dyn DumpWriter) -> Result<()>;

    /// Serialize rows of `table`. Returns the number of rows written.
    async fn dump(&self, out: &mut dyn DumpWriter, table: &str, rows: &[Row]) -> Result<u64>;

    /// Visits the current configuration still selects.
    async fn count_matching(&self) -> Result<u64>;

    /// Rows of the site in scope left outside the visit log. 0 for
    /// historical runs.
    async fn pending_site_rows(&self) -> Result<u64>;

    /// One bounded invocation. Returns the visits processed; 0 once done.
    async fn execute(&self, out: &mut dyn DumpWriter) -> Result<u64>;

    /// Tables worth optimizing after a purge.
    async fn tables_to_optimize(&self) -> Result<Vec<String>>;

    async fn optimize_table(&self, table: &str) -> Result<()>;

    /// Re-derive a retention cutoff from the clock. Fixed cutoffs and site
    /// runs are unaffected.
    fn refresh_cutoff(&self) -> Result<()>;

    /// The configuration this dialect runs with, cutoff resolved.
    fn run_config(&self) -> Result<RunConfig>;
}

/// Phase reached by an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    PrimaryExtraction,
    SiteCleanup,
    Done,
}

/// A run configuration resolved against the clock, with its predicate.
#[derive(Debug, Clone)]
struct Selection {
    config: RunConfig,
    filter: Filter,
}

impl Selection {
    fn at(base: &RunConfig, now: DateTime<Local>) -> Result<Self> {
        let config = base.resolved_at(now)?;
        let filter = Filter::for_run(&config)?;
        Ok(Self { config, filter })
    }
}

/// `mysqldump` compatible output for the Piwik log schema.
pub struct MySqlDialect {
    config: RunConfig,
    selection: Mutex<Option<Selection>>,
    storage: Arc<dyn Storage>,
    resolver: Arc<dyn TableResolver>,
    guard: Arc<dyn MemoryGuard>,
    clock: Arc<dyn Clock>,
    pattern: ArchivePattern,
    serializer: DumpSerializer,
    reconnect_after: Duration,
    connected_at: Mutex<Option<DateTime<Local>>>,
}

impl MySqlDialect {
    /// Validates `config`. The selection filter is derived against the
    /// dialect's clock on first use.
    pub fn new(
        config: RunConfig,
        storage: Arc<dyn Storage>,
        resolver: Arc<dyn TableResolver>,
    ) -> Result<Self> {
        let config = config.validated()?;
        Selection::at(&config, Local::now())?;
        let pattern = ArchivePattern::for_resolver(resolver.as_ref())?;

        Ok(Self {
            config,
            selection: Mutex::new(None),
            storage,
            resolver,
            guard: Arc::new(Unlimited),
            clock: Arc::new(SystemClock),
            pattern,
            serializer: DumpSerializer::default(),
            reconnect_after: Duration::seconds(DEFAULT_RECONNECT_AFTER_SECS),
            connected_at: Mutex::new(None),
        })
    }

    pub fn with_guard(mut self, guard: Arc<dyn MemoryGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        *self.selection.get_mut() = None;
        self
    }

    pub fn with_tool_info(mut self, tool: ToolInfo) -> Self {
        self.serializer = DumpSerializer::new(tool);
        self
    }

    pub fn with_reconnect_after(mut self, after: Duration) -> Self {
        self.reconnect_after = after;
        self
    }

    /// The predicate the next count or invocation uses.
    pub fn filter(&self) -> Result<Filter> {
        Ok(self.selection()?.filter)
    }

    fn selection(&self) -> Result<Selection> {
        let mut current = self.selection.lock();
        if let Some(selection) = current.as_ref() {
            return Ok(selection.clone());
        }
        let selection = Selection::at(&self.config, self.clock.now())?;
        *current = Some(selection.clone());
        Ok(selection)
    }

    fn site_cleanup(&self, site_id: u32) -> SiteScopeCleanup<'_> {
        SiteScopeCleanup::new(
            self.storage.as_ref(),
            self.guard.as_ref(),
            self.resolver.as_ref(),
            &self.pattern,
            &self.serializer,
            site_id,
        )
    }

    /// Ask the store to reconnect once the connection outlived `reconnect_after`.
    async fn refresh_connection(&self) -> Result<()> {
        let now = self.clock.now();
        let stale = {
            let mut connected_at = self.connected_at.lock();
            match *connected_at {
                Some(since) if now - since > self.reconnect_after => {
                    *connected_at = Some(now);
                    true
                }
                Some(_) => false,
                None => {
                    *connected_at = Some(now);
                    false
                }
            }
        };

        if stale {
            debug!(reconnect_after_secs = self.reconnect_after.num_seconds(), "Reconnecting storage");
            self.storage.reconnect().await?;
        }
        Ok(())
    }

    async fn run_phases(
        &self,
        out: &mut dyn DumpWriter,
        filter: &Filter,
    ) -> Result<(u64, RunPhase)> {
        self.refresh_connection().await?;

        let processed = PrimaryLogExtractor::new(
            self.storage.as_ref(),
            self.guard.as_ref(),
            self.resolver.as_ref(),
            &self.serializer,
            filter,
            self.config.limit,
        )
        .run(out)
        .await?;

        if processed > 0 {
            return Ok((processed, RunPhase::PrimaryExtraction));
        }

        let Some(site_id) = self.config.site_scope() else {
            return Ok((0, RunPhase::Done));
        };

        self.site_cleanup(site_id).run(out).await?;

        Ok((0, RunPhase::SiteCleanup))
    }
}

#[async_trait]
impl Dialect for MySqlDialect {
    async fn write_preamble(&self, out: &mut dyn DumpWriter) -> Result<()> {
        self.serializer.write_preamble(out, self.clock.now()).await
    }

    async fn write_appendix(&self, out: &mut dyn DumpWriter) -> Result<()> {
        self.serializer.write_appendix(out, self.clock.now()).await
    }

    async fn dump(&self, out: &mut dyn DumpWriter, table: &str, rows: &[Row]) -> Result<u64> {
        self.serializer.write_rows(out, table, rows).await
    }

    async fn count_matching(&self) -> Result<u64> {
        let filter = self.selection()?.filter;
        let value = self
            .storage
            .fetch_one(&Query::count(self.resolver.resolve(LOG_VISIT), filter))
            .await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0))
    }

    async fn pending_site_rows(&self) -> Result<u64> {
        match self.config.site_scope() {
            Some(site_id) => self.site_cleanup(site_id).remaining().await,
            None => Ok(0),
        }
    }

    async fn execute(&self, out: &mut dyn DumpWriter) -> Result<u64> {
        let span = tracing::info_span!(
            "purge_run",
            run_id = %Uuid::new_v4(),
            site_id = self.config.site_scope().unwrap_or(0),
            limit = self.config.limit,
        );

        async {
            let started = std::time::Instant::now();
            metrics().runs_started.inc();

            let filter = self.selection()?.filter;
            let (processed, phase) = self.run_phases(out, &filter).await?;

            metrics()
                .pass_latency_ms
                .observe(started.elapsed().as_millis() as u64);
            if processed == 0 {
                metrics().runs_completed.inc();
            }
            info!(
                processed = processed,
                phase = ?phase,
                filter = %filter,
                "Purge run finished"
            );
            Ok::<_, purge_core::Error>(processed)
        }
        .instrument(span)
        .await
    }

    async fn tables_to_optimize(&self) -> Result<Vec<String>> {
        self.refresh_connection().await?;

        let mut tables = archive_tables(self.storage.as_ref(), &self.pattern).await?;
        tables.extend(
            SITE_AUX_TABLES
                .iter()
                .chain(LOG_TABLES.iter())
                .map(|t| self.resolver.resolve(t)),
        );
        Ok(tables)
    }

    async fn optimize_table(&self, table: &str) -> Result<()> {
        self.refresh_connection().await?;
        self.storage.execute(&Statement::optimize(table)).await?;
        debug!(table = table, "Table optimized");
        Ok(())
    }

    fn refresh_cutoff(&self) -> Result<()> {
        let selection = Selection::at(&self.config, self.clock.now())?;
        debug!(filter = %selection.filter, "Selection resolved");
        *self.selection.lock() = Some(selection);
        Ok(())
    }

    fn run_config(&self) -> Result<RunConfig> {
        Ok(self.selection()?.config)
    }
}
