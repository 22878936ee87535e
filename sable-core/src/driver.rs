//! Driver adapter contract and connection configuration

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::value::{Row, TypeTag, Value};
use crate::{Error, Result};

/// Opaque handle identifying a live result set inside a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultHandle(u64);

impl ResultHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Connection settings handed to [`Driver::connect`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database name or file path, backend dependent
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Backend-specific options as opaque strings
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Backend adapter. Implementations wrap one database client library
/// and expose it through a uniform synchronous surface.
///
/// `escape` and `unescape` have default implementations that delegate
/// to the driver's dialect; adapters override them only when the client
/// library offers its own escaping.
pub trait Driver {
    fn connect(&mut self, config: &Config) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn dialect(&self) -> &Dialect;

    /// Execute raw SQL, returning a handle for any produced result set
    fn execute(&mut self, sql: &str) -> Result<ResultHandle>;

    /// Fetch the next row, or `None` when the set is exhausted
    fn fetch_row(&mut self, handle: ResultHandle) -> Result<Option<Row>>;

    /// Move the read position of a result set. Drivers over unbuffered
    /// transports return `Unsupported`.
    fn seek(&mut self, handle: ResultHandle, position: u64) -> Result<()>;

    fn row_count(&mut self, handle: ResultHandle) -> Result<u64>;

    fn free_result(&mut self, handle: ResultHandle);

    fn affected_rows(&mut self) -> Result<u64>;

    fn last_insert_id(&mut self) -> Result<i64>;

    fn escape(&self, value: &Value, tag: TypeTag) -> Result<String> {
        self.dialect().escape(value, tag)
    }

    /// Decode a backend-native value. The default handles binary
    /// passthrough, the only decoding the base dialects require.
    fn unescape(&self, value: Value, tag: TypeTag) -> Result<Value> {
        match (tag, &value) {
            (TypeTag::Binary, Value::Binary(_)) => Ok(value),
            _ => Err(Error::invalid_argument(format!(
                "cannot unescape value as {}",
                tag.marker()
            ))),
        }
    }

    /// Name of the table's primary key column, if it has one
    fn primary_key_of(&mut self, table: &str) -> Result<Option<String>>;

    /// Column name to declared type mapping for a result set's table
    fn column_types_of(&mut self, handle: ResultHandle, table: &str)
        -> Result<HashMap<String, String>>;

    fn begin_transaction(&mut self, savepoint: Option<&str>) -> Result<()>;

    fn commit(&mut self, savepoint: Option<&str>) -> Result<()>;

    fn rollback(&mut self, savepoint: Option<&str>) -> Result<()>;
}

/// Cache for expensive table metadata lookups (primary keys, column types)
pub trait MetadataCache {
    fn fetch(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: &str);
}

/// Cache that never stores anything; every lookup goes to the backend
#[derive(Debug, Default)]
pub struct NullCache;

impl MetadataCache for NullCache {
    fn fetch(&self, _key: &str) -> Option<String> {
        None
    }

    fn store(&self, _key: &str, _value: &str) {}
}

/// In-process cache living as long as the connection
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataCache for MemoryCache {
    fn fetch(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
    }
}
