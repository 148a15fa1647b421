//! Chunking limits for the purge pipeline.
//!
//! Visits are fetched `limit` at a time. Their identifiers are then processed in
//! fixed slices so `IN (...)` lists stay short, and dependent tables are paged
//! with a size derived from `limit` so a visit with thousands of actions cannot
//! blow up a single fetch.

/// Default number of visits fetched per pass.
pub const DEFAULT_LIMIT: u32 = 500;

/// Visit identifiers per dependent-table dump slice.
pub const DEPENDENT_SLICE_SIZE: usize = 40;

/// Visit identifiers per primary-table delete statement.
pub const DELETE_SLICE_SIZE: usize = 50;

/// Smallest dependent-table page.
pub const MIN_PAGE_SIZE: u32 = 5;

/// Largest dependent-table page.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Page size for dependent tables: a tenth of the visit limit, fenced to 5..=200.
pub fn dependent_page_size(limit: u32) -> u32 {
    (limit / 10).clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}
