//! Dump output seam.

use async_trait::async_trait;

use crate::error::Result;

/// Line-oriented append-only sink for the dump.
#[async_trait]
pub trait DumpWriter: Send {
    /// Append one line. Lines are written in call order.
    async fn put(&mut self, line: &str) -> Result<()>;
}

/// Collects lines in memory.
#[async_trait]
impl DumpWriter for Vec<String> {
    async fn put(&mut self, line: &str) -> Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}
