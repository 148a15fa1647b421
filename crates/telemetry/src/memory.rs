//! Process memory guard.
//!
//! Trips once resident memory plus a safety reserve reaches the configured
//! limit, so a run aborts before the allocator does.

use purge_core::{Error, MemoryGuard, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::metrics::metrics;

/// `/proc/self/statm` counts pages; 4 KiB unless the kernel says otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Memory guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Hard limit in bytes. 0 disables the guard.
    #[serde(default)]
    pub limit_bytes: u64,
    /// Headroom kept free below the limit.
    #[serde(default = "default_reserve_bytes")]
    pub reserve_bytes: u64,
    /// Kernel page size. Set to 16384 or 65536 on kernels built with larger pages.
    #[serde(default = "default_page_size_bytes")]
    pub page_size_bytes: u64,
}

fn default_reserve_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_page_size_bytes() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit_bytes: 0,
            reserve_bytes: default_reserve_bytes(),
            page_size_bytes: default_page_size_bytes(),
        }
    }
}

type Sampler = Box<dyn Fn() -> Option<u64> + Send + Sync>;

/// Memory guard backed by the process resident set size.
pub struct ProcessMemoryGuard {
    config: MemoryConfig,
    sampler: Sampler,
}

impl ProcessMemoryGuard {
    pub fn new(config: MemoryConfig) -> Self {
        let page_size = config.page_size_bytes;
        Self::with_sampler(config, move || resident_bytes(page_size))
    }

    /// Guard with a custom usage source, in bytes.
    pub fn with_sampler(
        config: MemoryConfig,
        sampler: impl Fn() -> Option<u64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            sampler: Box::new(sampler),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.limit_bytes > 0
    }
}

impl MemoryGuard for ProcessMemoryGuard {
    fn check(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        // Unknown usage (non-Linux) never trips the guard.
        let Some(used) = (self.sampler)() else {
            return Ok(());
        };

        let limit = self.config.limit_bytes;
        if used.saturating_add(self.config.reserve_bytes) >= limit {
            metrics().memory_aborts.inc();
            warn!(
                used_bytes = used,
                limit_bytes = limit,
                reserve_bytes = self.config.reserve_bytes,
                "Memory limit reached, aborting run"
            );
            return Err(Error::resource_exhausted(used, limit));
        }

        Ok(())
    }
}

/// Resident set size of the current process.
pub fn resident_bytes(page_size: u64) -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    statm_resident_bytes(&statm, page_size)
}

/// The second `statm` field is the resident page count.
fn statm_resident_bytes(statm: &str, page_size: u64) -> Option<u64> {
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    pages.checked_mul(page_size)
}
