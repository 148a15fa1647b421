//! Run configuration and the row selection policy derived from it.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};
use crate::limits::DEFAULT_LIMIT;
use crate::value::Row;

/// Format used for `visit_last_action_time` comparisons.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column holding the site identifier in every site-owned table.
pub const SITE_COLUMN: &str = "idsite";

/// Column compared against the retention cutoff.
pub const LAST_ACTION_COLUMN: &str = "visit_last_action_time";

/// Options for one invocation. Immutable while the invocation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    /// Site to purge completely. Absent selects historical-retention mode.
    #[serde(rename = "idsite", default)]
    #[validate(range(min = 1))]
    pub site_id: Option<u32>,
    /// Retention cutoff, unix seconds. Visits last active before it are purged.
    #[serde(default)]
    pub until: i64,
    /// Retention as an age in days. Replaces `until` with `now - days` each
    /// time the config is resolved against a clock.
    #[serde(default)]
    #[validate(range(min = 1, max = 36500))]
    pub retention_days: Option<u32>,
    /// Visits fetched per pass; also drives the dependent table page size.
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl RunConfig {
    /// Historical-retention run purging visits older than `until`.
    pub fn historical(until: i64) -> Self {
        Self {
            site_id: None,
            until,
            retention_days: None,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Historical-retention run purging visits last active more than `days` ago.
    pub fn retention(days: u32) -> Self {
        Self {
            retention_days: Some(days),
            ..Self::historical(0)
        }
    }

    /// Site-purge run removing everything owned by `site_id`.
    pub fn site(site_id: u32) -> Self {
        Self {
            site_id: Some(site_id),
            until: 0,
            retention_days: None,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// The site in scope, if the run is in site-purge mode.
    pub fn site_scope(&self) -> Option<u32> {
        self.site_id.filter(|id| *id > 0)
    }

    /// Validate and return self.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Copy with the retention age turned into a concrete `until` relative to
    /// `now`. Site runs and fixed cutoffs come back unchanged.
    pub fn resolved_at(&self, now: DateTime<Local>) -> Result<Self> {
        let mut resolved = self.clone();
        if let (None, Some(days)) = (self.site_scope(), self.retention_days) {
            let cutoff = now
                .checked_sub_signed(Duration::days(i64::from(days)))
                .ok_or_else(|| Error::validation(format!("retention out of range: {} days", days)))?;
            resolved.until = cutoff.timestamp();
        }
        Ok(resolved)
    }

    /// The cutoff rendered in the local time zone.
    pub fn cutoff(&self) -> Result<NaiveDateTime> {
        Local
            .timestamp_opt(self.until, 0)
            .single()
            .map(|dt| dt.naive_local())
            .ok_or_else(|| Error::validation(format!("invalid cutoff timestamp: {}", self.until)))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::historical(0)
    }
}

/// A WHERE predicate. Rendering and in-process matching share one definition
/// so counts and extraction always select the same rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `idsite = N`
    Site(u32),
    /// `visit_last_action_time < 'Y-m-d H:i:s'`
    LastActionBefore(NaiveDateTime),
    /// `column IN (a,b,c)`
    IdIn { column: String, ids: Vec<u64> },
}

impl Filter {
    /// Selection policy for the primary log table.
    pub fn for_run(config: &RunConfig) -> Result<Self> {
        match config.site_scope() {
            Some(site) => Ok(Self::Site(site)),
            None => Ok(Self::LastActionBefore(config.cutoff()?)),
        }
    }

    pub fn id_in(column: impl Into<String>, ids: &[u64]) -> Self {
        Self::IdIn {
            column: column.into(),
            ids: ids.to_vec(),
        }
    }

    /// SQL text for the WHERE clause, without the keyword.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Site(site) => format!("{} = {}", SITE_COLUMN, site),
            Self::LastActionBefore(cutoff) => {
                format!("{} < '{}'", LAST_ACTION_COLUMN, cutoff.format(DATETIME_FORMAT))
            }
            Self::IdIn { column, ids } => {
                let list = ids
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{} IN ({})", column, list)
            }
        }
    }

    /// Evaluate the predicate against an already fetched row.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Site(site) => row
                .get(SITE_COLUMN)
                .and_then(|v| v.as_u64())
                .is_some_and(|v| v == u64::from(*site)),
            Self::LastActionBefore(cutoff) => row
                .get(LAST_ACTION_COLUMN)
                .and_then(|v| v.as_datetime())
                .is_some_and(|ts| ts < *cutoff),
            Self::IdIn { column, ids } => row
                .get(column)
                .and_then(|v| v.as_u64())
                .is_some_and(|id| ids.contains(&id)),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}
