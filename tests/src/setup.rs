//! Common test setup functions.

use chrono::{Local, TimeZone};
use purge_core::{ManualClock, MemoryGuard, MemoryStore, PrefixResolver, RunConfig};
use std::sync::Arc;
use worker::MySqlDialect;

use crate::fixtures::{self, PREFIX};
use crate::mocks::{RecordingStorage, RecordingWriter, SharedLines};

/// In-memory Piwik schema watched by a dump-before-delete check.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<RecordingStorage>,
    pub lines: SharedLines,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    /// Empty schema with every table the purge touches.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        fixtures::create_schema(&store);

        let lines = SharedLines::default();
        let storage = Arc::new(RecordingStorage::new(store.clone(), lines.clone()));
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2013, 2, 1, 3, 0, 0).single().unwrap(),
        ));

        Self {
            store,
            storage,
            lines,
            clock,
        }
    }

    pub fn dialect(&self, config: RunConfig) -> MySqlDialect {
        MySqlDialect::new(
            config,
            self.storage.clone(),
            Arc::new(PrefixResolver::new(PREFIX)),
        )
        .expect("valid run config")
        .with_clock(self.clock.clone())
    }

    pub fn dialect_with_guard(&self, config: RunConfig, guard: Arc<dyn MemoryGuard>) -> MySqlDialect {
        self.dialect(config).with_guard(guard)
    }

    pub fn writer(&self) -> RecordingWriter {
        RecordingWriter::new(self.lines.clone())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// INSERT lines written for one table.
    pub fn inserts_for(&self, table: &str) -> Vec<String> {
        let prefix = format!("INSERT INTO `{}` ", table);
        self.lines
            .lock()
            .iter()
            .filter(|line| line.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.store.row_count(table)
    }

    /// SQL issued so far, in order.
    pub fn journal(&self) -> Vec<String> {
        self.store.journal()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
