//! MySQL dump framing and INSERT statements.

use chrono::{DateTime, Local, SecondsFormat};
use purge_core::codec::{encode, quote_identifier};
use purge_core::{DumpWriter, Result, Row};
use telemetry::metrics;

/// Identity written into the dump header.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    /// Version of the application owning the schema, if known.
    pub application_version: Option<String>,
}

impl Default for ToolInfo {
    fn default() -> Self {
        Self {
            name: "log-purge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            application_version: None,
        }
    }
}

/// Writes the dump through a `DumpWriter`.
#[derive(Debug, Clone, Default)]
pub struct DumpSerializer {
    tool: ToolInfo,
}

impl DumpSerializer {
    pub fn new(tool: ToolInfo) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &ToolInfo {
        &self.tool
    }

    /// Header written once at the top of each dump file.
    pub async fn write_preamble(
        &self,
        out: &mut dyn DumpWriter,
        now: DateTime<Local>,
    ) -> Result<()> {
        let mut lines = vec![
            "-- ".to_string(),
            "--  Mysql Dump".to_string(),
            format!("--  created {}", timestamp(now)),
            format!("--  generated by {}", self.tool.name),
            format!("--  Version {}", self.tool.version),
        ];
        if let Some(app) = &self.tool.application_version {
            lines.push(format!("--  Application-Version: {}", app));
        }
        lines.extend(
            [
                "-- ",
                "",
                "SET SQL_MODE=\"NO_AUTO_VALUE_ON_ZERO\";",
                "SET FOREIGN_KEY_CHECKS=0;",
                "",
                "/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;",
                "/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;",
                "/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;",
                "/*!40101 SET NAMES utf8 */;",
                "",
            ]
            .map(str::to_string),
        );

        for line in &lines {
            out.put(line).await?;
        }
        Ok(())
    }

    /// Footer written once at the end of each dump file.
    pub async fn write_appendix(
        &self,
        out: &mut dyn DumpWriter,
        now: DateTime<Local>,
    ) -> Result<()> {
        let lines = [
            String::new(),
            "/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;".to_string(),
            "/*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;".to_string(),
            "/*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;".to_string(),
            String::new(),
            "-- ".to_string(),
            format!("-- Mysql Dump End {}", timestamp(now)),
            "-- ".to_string(),
        ];

        for line in &lines {
            out.put(line).await?;
        }
        Ok(())
    }

    /// One INSERT per row, in fetch order. Returns the number of rows written.
    pub async fn write_rows(
        &self,
        out: &mut dyn DumpWriter,
        table: &str,
        rows: &[Row],
    ) -> Result<u64> {
        for row in rows {
            out.put(&insert_statement(table, row)).await?;
        }

        let written = rows.len() as u64;
        metrics().statements_written.inc_by(written);
        metrics().rows_dumped.inc_by(written);
        Ok(written)
    }
}

/// Build the complete INSERT for one row. Columns keep the row's order.
pub fn insert_statement(table: &str, row: &Row) -> String {
    let (columns, values): (Vec<String>, Vec<String>) = row
        .iter()
        .map(|(column, value)| (quote_identifier(column), encode(table, column, value)))
        .unzip();

    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_identifier(table),
        columns.join(","),
        values.join(",")
    )
}

fn timestamp(now: DateTime<Local>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}
