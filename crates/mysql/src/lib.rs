//! MySQL storage backend for the purge engine.

pub mod client;
pub mod config;
pub mod decode;
pub mod health;

pub use client::*;
pub use config::*;
