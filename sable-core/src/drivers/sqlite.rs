//! SQLite driver over a sqlx connection pool.
//!
//! The library API is synchronous, so the driver owns a current-thread
//! tokio runtime and blocks on each sqlx call. Result sets are fully
//! buffered; seeking and counting always work.

use std::collections::HashMap;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tokio::runtime::Runtime;

use crate::dialect::Dialect;
use crate::driver::{Config, Driver, ResultHandle};
use crate::value::{Row, Value};
use crate::{Error, Result};

struct BufferedResult {
    rows: Vec<Row>,
    pos: usize,
}

pub struct SqliteDriver {
    runtime: Runtime,
    pool: Option<SqlitePool>,
    dialect: Dialect,
    results: HashMap<u64, BufferedResult>,
    next_handle: u64,
    affected: u64,
    last_insert_id: i64,
}

impl SqliteDriver {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::connection_from("cannot start sqlite worker runtime", Box::new(e))
            })?;
        Ok(Self {
            runtime,
            pool: None,
            dialect: Dialect::sqlite(),
            results: HashMap::new(),
            next_handle: 1,
            affected: 0,
            last_insert_id: 0,
        })
    }

    fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .clone()
            .ok_or_else(|| Error::connection("sqlite driver is not connected"))
    }

    fn result_mut(&mut self, handle: ResultHandle) -> Result<&mut BufferedResult> {
        self.results
            .get_mut(&handle.id())
            .ok_or_else(|| Error::invalid_argument("unknown result handle"))
    }

    fn store_result(&mut self, rows: Vec<Row>) -> ResultHandle {
        let handle = ResultHandle::new(self.next_handle);
        self.next_handle += 1;
        self.results.insert(handle.id(), BufferedResult { rows, pos: 0 });
        handle
    }

    fn run_statement(&mut self, sql: &str) -> Result<ResultHandle> {
        let pool = self.pool()?;
        if produces_rows(sql) {
            let fetched = self
                .runtime
                .block_on(sqlx::query(sql).fetch_all(&pool))
                .map_err(|e| query_error(sql, e))?;
            let rows = fetched
                .iter()
                .map(convert_row)
                .collect::<Result<Vec<_>>>()?;
            Ok(self.store_result(rows))
        } else {
            let done = self
                .runtime
                .block_on(sqlx::query(sql).execute(&pool))
                .map_err(|e| query_error(sql, e))?;
            self.affected = done.rows_affected();
            self.last_insert_id = done.last_insert_rowid();
            Ok(self.store_result(Vec::new()))
        }
    }

    fn table_info(&mut self, table: &str) -> Result<Vec<(String, String, bool)>> {
        let pool = self.pool()?;
        let sql = format!("PRAGMA table_info({})", self.dialect.quote_identifier(table));
        let fetched = self
            .runtime
            .block_on(sqlx::query(&sql).fetch_all(&pool))
            .map_err(|e| query_error(&sql, e))?;
        let mut columns = Vec::with_capacity(fetched.len());
        for row in &fetched {
            let name: String = row.try_get("name").map_err(|e| query_error(&sql, e))?;
            let declared: String = row.try_get("type").map_err(|e| query_error(&sql, e))?;
            let pk: i64 = row.try_get("pk").map_err(|e| query_error(&sql, e))?;
            columns.push((name, declared.to_uppercase(), pk > 0));
        }
        Ok(columns)
    }
}

impl Driver for SqliteDriver {
    fn connect(&mut self, config: &Config) -> Result<()> {
        let url = match config.database.as_deref() {
            None | Some(":memory:") => "sqlite::memory:".to_string(),
            Some(path) => format!("sqlite:{path}?mode=rwc"),
        };
        if config.options.get("update_limit").map(String::as_str) == Some("true") {
            self.dialect = Dialect::sqlite().with_row_limited_mutations(true);
        }
        let pool = self
            .runtime
            .block_on(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(&url),
            )
            .map_err(|e| Error::connection_from("cannot open sqlite database", Box::new(e)))?;
        self.pool = Some(pool);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            self.runtime.block_on(pool.close());
        }
        self.results.clear();
        Ok(())
    }

    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn execute(&mut self, sql: &str) -> Result<ResultHandle> {
        self.run_statement(sql)
    }

    fn fetch_row(&mut self, handle: ResultHandle) -> Result<Option<Row>> {
        let result = self.result_mut(handle)?;
        let row = result.rows.get(result.pos).cloned();
        if row.is_some() {
            result.pos += 1;
        }
        Ok(row)
    }

    fn seek(&mut self, handle: ResultHandle, position: u64) -> Result<()> {
        let result = self.result_mut(handle)?;
        if position as usize > result.rows.len() {
            return Err(Error::invalid_argument(format!(
                "cannot seek to row {position}, result set has {} rows",
                result.rows.len()
            )));
        }
        result.pos = position as usize;
        Ok(())
    }

    fn row_count(&mut self, handle: ResultHandle) -> Result<u64> {
        Ok(self.result_mut(handle)?.rows.len() as u64)
    }

    fn free_result(&mut self, handle: ResultHandle) {
        self.results.remove(&handle.id());
    }

    fn affected_rows(&mut self) -> Result<u64> {
        Ok(self.affected)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.last_insert_id)
    }

    fn primary_key_of(&mut self, table: &str) -> Result<Option<String>> {
        let keys: Vec<String> = self
            .table_info(table)?
            .into_iter()
            .filter(|(_, _, pk)| *pk)
            .map(|(name, _, _)| name)
            .collect();
        // composite keys have no single usable column
        Ok(match keys.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        })
    }

    fn column_types_of(
        &mut self,
        _handle: ResultHandle,
        table: &str,
    ) -> Result<HashMap<String, String>> {
        Ok(self
            .table_info(table)?
            .into_iter()
            .map(|(name, declared, _)| (name, declared))
            .collect())
    }

    fn begin_transaction(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("SAVEPOINT {name}"),
            None => "BEGIN".to_string(),
        };
        self.run_statement(&sql).map(|_| ())
    }

    fn commit(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("RELEASE SAVEPOINT {name}"),
            None => "COMMIT".to_string(),
        };
        self.run_statement(&sql).map(|_| ())
    }

    fn rollback(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {name}"),
            None => "ROLLBACK".to_string(),
        };
        self.run_statement(&sql).map(|_| ())
    }
}

fn produces_rows(sql: &str) -> bool {
    let head: String = sql.trim_start().chars().take(6).collect::<String>().to_uppercase();
    head.starts_with("SELECT") || head.starts_with("PRAGMA") || head.starts_with("WITH")
}

fn query_error(sql: &str, err: sqlx::Error) -> Error {
    let mut error = Error::query_execution_from("sqlite query failed", None, Box::new(err));
    error = error.with_sql(sql);
    error
}

fn convert_row(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| Error::query_execution_from("cannot read column", None, Box::new(e)))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => row.try_get::<i64, _>(i).map(Value::Int),
                "REAL" => row.try_get::<f64, _>(i).map(Value::Float),
                "BLOB" => row.try_get::<Vec<u8>, _>(i).map(Value::Binary),
                "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::Bool),
                // sqlite stores timestamps as text; decode and re-parse
                "DATETIME" | "DATE" => row.try_get::<String, _>(i).map(|text| {
                    match chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S") {
                        Ok(dt) => Value::DateTime(dt),
                        Err(_) => Value::Text(text),
                    }
                }),
                _ => row.try_get::<String, _>(i).map(Value::Text),
            }
            .map_err(|e| Error::query_execution_from("cannot decode column", None, Box::new(e)))?
        };
        out.insert(column.name(), value);
    }
    Ok(out)
}
