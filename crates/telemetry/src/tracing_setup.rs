//! Tracing setup for structured logging.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// sqlx logs every statement at info; a purge issues thousands of them.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "worker=debug")
    pub filter: String,
    /// JSON lines instead of human readable output
    pub json: bool,
    /// Log span open/close (one pair per purge run)
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Falls back to `DEFAULT_FILTER` when the directives do not parse.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize tracing with the given configuration.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(config: TracingConfig) -> bool {
    // JSON lines carry the current span so every event keeps its run_id.
    let fmt_layer = if config.json {
        fmt::layer()
            .json()
            .with_span_events(config.span_events())
            .with_current_span(true)
            .with_span_list(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_span_events(config.span_events())
            .with_target(true)
            .boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    installed
}

/// Initialize tracing from environment variables.
///
/// `RUST_LOG` sets the filter, `LOG_JSON=1` switches to JSON lines and
/// `LOG_SPANS=1` logs the start and end of every purge run span.
pub fn init_tracing_from_env() -> bool {
    init_tracing(config_from_lookup(|name| std::env::var(name).ok()))
}

fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TracingConfig {
    let flag = |name: &str| {
        lookup(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };

    TracingConfig::new()
        .with_filter(lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()))
        .with_json(flag("LOG_JSON"))
        .with_span_events(flag("LOG_SPANS"))
}
