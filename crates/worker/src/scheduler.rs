//! Drives dialect invocations into dump files.
//!
//! Shutdown is only observed between invocations. An invocation that has
//! started always runs to completion so that every deleted row is already in
//! the dump file.
//!
//! Each drain starts by refreshing the dialect's retention cutoff, so a
//! long running schedule keeps purging visits as they age.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use purge_core::{Clock, Result, RunConfig, SystemClock};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dialect::Dialect;
use crate::file::DumpFile;

/// How the scheduler repeats invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// A single invocation.
    Once,
    /// Invocations until one returns 0.
    #[default]
    Drain,
    /// A drain every `interval` until shutdown.
    Schedule,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mode: RunMode,
    /// Pause between drains in schedule mode
    pub interval: Duration,
    /// Optimize touched tables once a drain completes
    pub optimize_after: bool,
    /// Upper bound on invocations per drain
    pub max_invocations: Option<u32>,
    pub dump_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Drain,
            interval: Duration::from_secs(3600), // 1 hour
            optimize_after: false,
            max_invocations: None,
            dump_dir: PathBuf::from("dumps"),
            file_prefix: "purge".to_string(),
        }
    }
}

/// Outcome of one dump file worth of invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub invocations: u32,
    pub visits_processed: u64,
    /// The last invocation returned 0.
    pub completed: bool,
    pub tables_optimized: usize,
    pub dump_path: Option<PathBuf>,
}

/// Label used in dump file names: `site-7` or `until-20130101-000000`.
pub fn dump_label(config: &RunConfig) -> Result<String> {
    match config.site_scope() {
        Some(site_id) => Ok(format!("site-{}", site_id)),
        None => Ok(format!("until-{}", config.cutoff()?.format("%Y%m%d-%H%M%S"))),
    }
}

pub struct PurgeScheduler {
    dialect: Arc<dyn Dialect>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
}

impl PurgeScheduler {
    pub fn new(dialect: Arc<dyn Dialect>, config: SchedulerConfig) -> Self {
        Self {
            dialect,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run according to the configured mode until done or `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<Vec<DrainReport>> {
        match self.config.mode {
            RunMode::Once => Ok(vec![self.run_once().await?]),
            RunMode::Drain => Ok(vec![self.drain(&shutdown).await?]),
            RunMode::Schedule => {
                let mut reports = Vec::new();
                let mut ticker = interval(self.config.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = shutdown.changed() => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                    if *shutdown.borrow() {
                        break;
                    }

                    match self.scheduled_drain(&shutdown).await {
                        Ok(Some(report)) => reports.push(report),
                        Ok(None) => {}
                        Err(e) => {
                            error!("Scheduled purge error: {}", e);
                        }
                    }
                }
                Ok(reports)
            }
        }
    }

    /// One invocation into its own dump file.
    pub async fn run_once(&self) -> Result<DrainReport> {
        let (_tx, rx) = watch::channel(false);
        self.dialect.refresh_cutoff()?;
        self.drain_with_budget(&rx, Some(1)).await
    }

    /// Invocations into one dump file until an invocation returns 0.
    pub async fn drain(&self, shutdown: &watch::Receiver<bool>) -> Result<DrainReport> {
        self.dialect.refresh_cutoff()?;
        self.drain_with_budget(shutdown, self.config.max_invocations)
            .await
    }

    /// Skips the pass when no visit matches and no row of the site in scope
    /// is left, so an idle or finished schedule writes no dump files.
    async fn scheduled_drain(&self, shutdown: &watch::Receiver<bool>) -> Result<Option<DrainReport>> {
        self.dialect.refresh_cutoff()?;
        let pending = self.dialect.count_matching().await?;
        metrics().pending_visits.set(pending);

        if pending == 0 && self.dialect.pending_site_rows().await? == 0 {
            debug!("Nothing pending, skipping scheduled purge");
            return Ok(None);
        }
        self.drain_with_budget(shutdown, self.config.max_invocations)
            .await
            .map(Some)
    }

    async fn drain_with_budget(
        &self,
        shutdown: &watch::Receiver<bool>,
        max_invocations: Option<u32>,
    ) -> Result<DrainReport> {
        let label = dump_label(&self.dialect.run_config()?)?;
        let mut file = DumpFile::create(
            &self.config.dump_dir,
            &self.config.file_prefix,
            &label,
            self.clock.now(),
        )
        .await?;
        info!(path = %file.path().display(), "Writing dump");

        self.dialect.write_preamble(&mut file).await?;
        let mut report = DrainReport::default();
        let outcome = self
            .invoke_until_done(&mut file, shutdown, max_invocations, &mut report)
            .await;

        // The dump must stay loadable even when an invocation failed.
        self.dialect.write_appendix(&mut file).await?;
        let path = file.finish().await?;
        report.dump_path = Some(path);

        if let Err(e) = outcome {
            metrics().run_errors.inc();
            warn!(
                invocations = report.invocations,
                visits = report.visits_processed,
                "Purge aborted: {}",
                e
            );
            return Err(e);
        }

        if report.completed && self.config.optimize_after {
            report.tables_optimized = self.optimize().await?;
        }

        info!(
            invocations = report.invocations,
            visits = report.visits_processed,
            completed = report.completed,
            "Drain finished"
        );
        Ok(report)
    }

    async fn invoke_until_done(
        &self,
        file: &mut DumpFile,
        shutdown: &watch::Receiver<bool>,
        max_invocations: Option<u32>,
        report: &mut DrainReport,
    ) -> Result<()> {
        loop {
            if max_invocations.is_some_and(|max| report.invocations >= max) {
                return Ok(());
            }
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping between invocations");
                return Ok(());
            }

            let processed = self.dialect.execute(file).await?;
            report.invocations += 1;
            report.visits_processed += processed;

            if processed == 0 {
                report.completed = true;
                return Ok(());
            }
        }
    }

    async fn optimize(&self) -> Result<usize> {
        let tables = self.dialect.tables_to_optimize().await?;
        for table in &tables {
            self.dialect.optimize_table(table).await?;
        }
        info!(tables = tables.len(), "Tables optimized");
        Ok(tables.len())
    }
}
