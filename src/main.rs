//! Piwik Visit Log Purge
//!
//! Incremental dump-and-purge of old or per-site visit log data:
//! - Bounded invocations that dump rows before deleting them
//! - Historical retention by last action time or complete site removal
//! - mysqldump compatible output files
//! - One-shot, drain and scheduled run modes

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use purge_core::RunConfig;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use mysql_store::{MySqlConfig, MySqlStore};
use telemetry::{health, init_tracing_from_env, metrics, MemoryConfig, ProcessMemoryGuard};
use worker::{Dialect, MySqlDialect, PurgeScheduler, RunMode, SchedulerConfig, ToolInfo};

/// Which rows to purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunSection {
    /// Purge this site completely
    #[serde(default)]
    idsite: Option<u32>,
    /// Cutoff as unix seconds
    #[serde(default)]
    until: Option<i64>,
    /// Cutoff as an age, re-evaluated at the start of every drain. Used when
    /// `until` is absent
    #[serde(default)]
    retention_days: Option<u32>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    purge_core::limits::DEFAULT_LIMIT
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            idsite: None,
            until: None,
            retention_days: None,
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpSection {
    #[serde(default = "default_dump_directory")]
    directory: String,
    #[serde(default = "default_file_prefix")]
    file_prefix: String,
    /// Schema application version noted in the dump header
    #[serde(default)]
    application_version: Option<String>,
}

fn default_dump_directory() -> String {
    "dumps".to_string()
}

fn default_file_prefix() -> String {
    "purge".to_string()
}

impl Default for DumpSection {
    fn default() -> Self {
        Self {
            directory: default_dump_directory(),
            file_prefix: default_file_prefix(),
            application_version: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    mode: RunMode,
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default)]
    optimize_after: bool,
    #[serde(default)]
    max_invocations: Option<u32>,
    /// Ask storage to reconnect once a connection is this old
    #[serde(default = "default_reconnect_after_secs")]
    reconnect_after_secs: i64,

    #[serde(default)]
    run: RunSection,

    #[serde(default)]
    mysql: MySqlConfig,

    #[serde(default)]
    dump: DumpSection,

    #[serde(default)]
    memory: MemoryConfig,
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_reconnect_after_secs() -> i64 {
    worker::DEFAULT_RECONNECT_AFTER_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            interval_secs: default_interval_secs(),
            optimize_after: false,
            max_invocations: None,
            reconnect_after_secs: default_reconnect_after_secs(),
            run: RunSection::default(),
            mysql: MySqlConfig::default(),
            dump: DumpSection::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting log purge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;
    let run_config = run_config(&config.run)?;

    info!(
        mode = ?config.mode,
        idsite = ?run_config.site_id,
        until = run_config.until,
        retention_days = ?run_config.retention_days,
        limit = run_config.limit,
        table_prefix = %config.mysql.table_prefix,
        "Loaded purge config"
    );

    // Connect to MySQL
    let store = Arc::new(
        MySqlStore::connect(config.mysql.clone())
            .await
            .context("Failed to connect to MySQL")?,
    );
    let resolver = Arc::new(store.resolver());

    // Check health and update status
    check_health(&config, &store).await?;

    let guard = ProcessMemoryGuard::new(config.memory.clone());
    if !guard.is_enabled() {
        info!("Memory guard disabled");
    }

    let tool = ToolInfo {
        application_version: config.dump.application_version.clone(),
        ..Default::default()
    };

    let dialect = Arc::new(
        MySqlDialect::new(run_config, store.clone(), resolver)
            .context("Invalid run configuration")?
            .with_guard(Arc::new(guard))
            .with_tool_info(tool)
            .with_reconnect_after(chrono::Duration::seconds(config.reconnect_after_secs)),
    );

    match dialect.count_matching().await {
        Ok(pending) => {
            metrics().pending_visits.set(pending);
            let filter = dialect.filter().map(|f| f.to_string()).unwrap_or_default();
            info!(pending = pending, filter = %filter, "Visits pending");
        }
        Err(e) => warn!("Failed to count pending visits: {}", e),
    }

    let scheduler = PurgeScheduler::new(
        dialect,
        SchedulerConfig {
            mode: config.mode,
            interval: Duration::from_secs(config.interval_secs),
            optimize_after: config.optimize_after,
            max_invocations: config.max_invocations,
            dump_dir: PathBuf::from(&config.dump.directory),
            file_prefix: config.dump.file_prefix.clone(),
        },
    );

    // Stop between invocations on Ctrl+C or SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_tx.send(true).ok();
    });

    let outcome = scheduler.run(shutdown_rx).await;

    match serde_json::to_string(&metrics().snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final metrics"),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }

    let reports = match outcome {
        Ok(reports) => reports,
        Err(e) => {
            error!(code = e.error_code().unwrap_or("-"), "Purge failed: {}", e);
            return Err(e.into());
        }
    };

    for report in &reports {
        info!(
            invocations = report.invocations,
            visits = report.visits_processed,
            completed = report.completed,
            tables_optimized = report.tables_optimized,
            dump = ?report.dump_path,
            "Purge report"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PURGE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(url) = std::env::var("PURGE_MYSQL_URL") {
        config.mysql.url = url;
    }
    if let Ok(prefix) = std::env::var("PURGE_MYSQL_TABLE_PREFIX") {
        config.mysql.table_prefix = prefix;
    }
    if let Ok(dir) = std::env::var("PURGE_DUMP_DIRECTORY") {
        config.dump.directory = dir;
    }

    Ok(config)
}

/// Resolve the run section into the options of one invocation.
fn run_config(run: &RunSection) -> Result<RunConfig> {
    let base = match (run.idsite, run.until, run.retention_days) {
        (Some(site), _, _) => RunConfig::site(site),
        (None, Some(until), _) => RunConfig::historical(until),
        (None, None, Some(days)) => RunConfig::retention(days),
        (None, None, None) => {
            bail!("Nothing to purge: set run.idsite, run.until or run.retention_days")
        }
    };

    Ok(base.with_limit(run.limit).validated()?)
}

/// Check component health on startup.
async fn check_health(config: &Config, store: &MySqlStore) -> Result<()> {
    // Check MySQL
    if mysql_store::health::check_connection(store).await {
        health().storage.set_healthy();
        info!("MySQL connection: healthy");
    } else {
        health().storage.set_unhealthy("Connection failed");
        error!("MySQL connection: unhealthy");
    }

    // Check dump directory
    match tokio::fs::create_dir_all(&config.dump.directory).await {
        Ok(()) => {
            health().dump_output.set_healthy();
            info!(directory = %config.dump.directory, "Dump directory: healthy");
        }
        Err(e) => {
            health().dump_output.set_unhealthy(e.to_string());
            error!(directory = %config.dump.directory, "Dump directory: unhealthy");
        }
    }

    if !health().is_ready() {
        bail!("Startup health check failed");
    }
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
