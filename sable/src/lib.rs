//! Sable - a fluent, dialect-aware SQL statement model.
//!
//! This crate is the public face of [`sable_core`]: everything is
//! re-exported here. A [`Connection`] hands out [`Statement`] builders,
//! statements render themselves through the driver's [`Dialect`] and
//! cache their result set until the next mutation.
//!
//! ```
//! use sable::{Dialect, TypeTag, Value};
//!
//! let dialect = Dialect::postgres();
//! assert_eq!(dialect.quote_identifier("users"), "\"users\"");
//! assert_eq!(
//!     dialect.escape(&Value::Bool(true), TypeTag::Bool).unwrap(),
//!     "true"
//! );
//! ```

pub use sable_core::*;

/// Bundled driver adapters, gated behind cargo features
pub use sable_core::drivers;
