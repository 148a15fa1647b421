//! Shared helpers for the purge integration tests.

pub mod fixtures;
pub mod setup;
