//! Core types, value codec, selection policy and collaborator seams for the
//! visit-log purge engine.

pub mod clock;
pub mod codec;
pub mod error;
pub mod guard;
pub mod limits;
pub mod output;
pub mod query;
pub mod selection;
pub mod storage;
pub mod tables;
pub mod value;

pub use clock::*;
pub use error::{Error, Result, StorageErrorCode};
pub use guard::*;
pub use output::*;
pub use query::*;
pub use selection::*;
pub use storage::*;
pub use tables::*;
pub use value::*;
