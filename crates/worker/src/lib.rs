//! Dump-and-purge pipeline for the visit log.
//!
//! Handles one bounded invocation at a time:
//! - Primary extraction (visits plus their dependent rows)
//! - Site cleanup (archives and site configuration)
//! - Dump framing and files
//! - Scheduling of repeated invocations

pub mod dialect;
pub mod extractor;
pub mod file;
pub mod primary;
pub mod scheduler;
pub mod serializer;
pub mod site_cleanup;

pub use dialect::*;
pub use extractor::{ChunkedExtractor, SliceOutcome};
pub use file::DumpFile;
pub use primary::PrimaryLogExtractor;
pub use scheduler::*;
pub use serializer::{DumpSerializer, ToolInfo};
pub use site_cleanup::{archive_tables, SiteScopeCleanup};
