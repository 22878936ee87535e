//! sable-core: a database-agnostic SQL statement model.
//!
//! Statements are built fluently, rendered lazily through the
//! connected driver's dialect, and executed at most once per shape:
//! every mutation invalidates the cached result set, every repeated
//! `run` reuses it.
//!
//! ```
//! use sable_core::{Dialect, TypeTag, Value};
//!
//! let dialect = Dialect::mysql();
//! assert_eq!(dialect.quote_identifier("users.name"), "`users`.`name`");
//! assert_eq!(
//!     dialect.escape(&Value::Bool(true), TypeTag::Bool).unwrap(),
//!     "1"
//! );
//! ```
//!
//! With the `sqlite` feature enabled, the bundled driver runs the whole
//! pipeline against a real database:
//!
//! ```ignore
//! use sable_core::{drivers::sqlite::SqliteDriver, Config, Connection};
//!
//! let conn = Connection::open(SqliteDriver::new()?, &Config::new())?;
//! let mut stmt = conn.select(&["id", "name"], "users");
//! stmt.where_("age >", 18).order("name").limit(10);
//! for row in stmt.rows()? {
//!     println!("{:?}", row?);
//! }
//! ```

pub mod condition;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod events;
mod parser;
pub mod statement;
pub mod value;

pub use condition::{Condition, Glue, SortDirection};
pub use connection::Connection;
pub use cursor::Cursor;
pub use dialect::{Dialect, LimitStyle};
pub use driver::{Config, Driver, MemoryCache, MetadataCache, NullCache, ResultHandle};
pub use error::{Error, Result};
pub use events::{Event, EventSubject, Observer, ObserverToken};
pub use statement::{JoinKind, SharedStatement, Statement, StatementKind};
pub use value::{Row, TypeTag, Value};
