//! Bundled driver adapters, each behind its own cargo feature

#[cfg(feature = "sqlite")]
pub mod sqlite;
