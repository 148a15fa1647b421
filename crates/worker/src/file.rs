//! Dump files on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use purge_core::{DumpWriter, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// A new dump file: `<dir>/<prefix>-<label>-<YYYYmmdd-HHMMSS>.sql`.
///
/// The file is created exclusively, an existing dump is never overwritten.
pub struct DumpFile {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl DumpFile {
    pub async fn create(
        dir: impl AsRef<Path>,
        prefix: &str,
        label: &str,
        now: DateTime<Local>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let path = dir.join(file_name(prefix, label, now));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "Dump file created");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Flush buffered lines and close the file.
    pub async fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        debug!(path = %self.path.display(), lines = self.lines, "Dump file closed");
        Ok(self.path)
    }
}

#[async_trait]
impl DumpWriter for DumpFile {
    async fn put(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.lines += 1;
        Ok(())
    }
}

fn file_name(prefix: &str, label: &str, now: DateTime<Local>) -> String {
    format!("{}-{}-{}.sql", prefix, label, now.format("%Y%m%d-%H%M%S"))
}
