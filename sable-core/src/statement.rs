//! The fluent statement builder.
//!
//! A [`Statement`] accumulates clauses through chained mutators, renders
//! itself to SQL through the connection's driver dialect, and caches its
//! result set until the next mutation invalidates it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::condition::{scan_placeholders, Condition, Glue, SortDirection};
use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::driver::ResultHandle;
use crate::events::{Event, EventSubject};
use crate::parser::{has_circular_references, Parser};
use crate::value::{Row, Value};
use crate::{Error, Result};

/// Statement reference that can appear as a subquery value
pub type SharedStatement = Rc<RefCell<Statement>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub(crate) fn event(&self) -> Event {
        match self {
            StatementKind::Select => Event::SELECT,
            StatementKind::Insert => Event::INSERT,
            StatementKind::Update => Event::UPDATE,
            StatementKind::Delete => Event::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

// Operators recognized at the tail of a `where_` field string
const FIELD_OPERATORS: [&str; 10] =
    ["=", "!=", "<>", ">=", "<=", ">", "<", "LIKE", "IN", "IS"];

fn split_field_operator(input: &str) -> (String, Option<String>) {
    let trimmed = input.trim();
    if let Some((field, tail)) = trimmed.rsplit_once(char::is_whitespace) {
        let upper = tail.to_uppercase();
        if FIELD_OPERATORS.contains(&upper.as_str()) {
            return (field.trim_end().to_string(), Some(upper));
        }
    }
    (trimmed.to_string(), None)
}

pub struct Statement {
    pub(crate) kind: StatementKind,
    pub(crate) source: String,
    pub(crate) columns: Vec<String>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) sorting: Vec<(String, Option<SortDirection>)>,
    pub(crate) random_order: bool,
    pub(crate) grouping: Option<(String, Option<String>)>,
    pub(crate) join: Option<Join>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) values: BTreeMap<String, Value>,
    scope_stack: Vec<bool>,
    performed: bool,
    cached_result: Option<ResultHandle>,
    elapsed: Option<Duration>,
    executions: u64,
    conn: Connection,
}

impl Statement {
    pub(crate) fn new(conn: Connection, kind: StatementKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            columns: vec!["*".to_string()],
            conditions: Vec::new(),
            sorting: Vec::new(),
            random_order: false,
            grouping: None,
            join: None,
            limit: None,
            offset: None,
            values: BTreeMap::new(),
            scope_stack: Vec::new(),
            performed: false,
            cached_result: None,
            elapsed: None,
            executions: 0,
            conn,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the statement has been executed since its last mutation
    pub fn performed(&self) -> bool {
        self.performed
    }

    /// Wall-clock time of the most recent execution
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Lifetime count of backend executions of this statement
    pub fn executed_count(&self) -> u64 {
        self.executions
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn cached_handle(&self) -> Option<ResultHandle> {
        self.cached_result
    }

    /// True while inside an `if_(false)` (or matching `else_`) scope
    fn gated(&self) -> bool {
        self.scope_stack.iter().any(|active| !active)
    }

    /// Drop the cached result set; the next run re-executes
    pub(crate) fn reset_state(&mut self) {
        self.performed = false;
        self.elapsed = None;
        if let Some(handle) = self.cached_result.take() {
            self.conn.free_result(handle);
        }
    }

    fn mutate(&mut self, apply: impl FnOnce(&mut Self)) -> &mut Self {
        if self.gated() {
            return self;
        }
        self.reset_state();
        apply(self);
        self
    }

    /// Restrict the selected columns. Replaces any previous column list.
    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(|stmt| {
            stmt.columns = columns.into_iter().map(Into::into).collect();
            if stmt.columns.is_empty() {
                stmt.columns.push("*".to_string());
            }
        })
    }

    /// Add a condition, AND-glued to the previous one.
    ///
    /// The field string may carry a trailing operator (`"age >"`); with
    /// none, the operator is inferred from the value shape. A field
    /// containing typed placeholders is treated as an expression
    /// fragment instead.
    pub fn where_(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.mutate(|stmt| stmt.push_condition(field, value))
    }

    /// Add an expression-form condition with one value per placeholder
    pub fn where_expr(&mut self, template: &str, values: Vec<Value>) -> &mut Self {
        let template = template.to_string();
        self.mutate(|stmt| stmt.push_expr(template, values))
    }

    /// Add an expression-form condition AND-glued to the previous one
    pub fn and_expr(&mut self, template: &str, values: Vec<Value>) -> &mut Self {
        let template = template.to_string();
        self.mutate(|stmt| {
            stmt.set_last_glue(Glue::And);
            stmt.push_expr(template, values);
        })
    }

    /// Add an expression-form condition OR-glued to the previous one
    pub fn or_expr(&mut self, template: &str, values: Vec<Value>) -> &mut Self {
        let template = template.to_string();
        self.mutate(|stmt| {
            stmt.set_last_glue(Glue::Or);
            stmt.push_expr(template, values);
        })
    }

    fn push_expr(&mut self, template: String, values: Vec<Value>) {
        let tags = scan_placeholders(&template)
            .into_iter()
            .map(|p| p.tag)
            .collect();
        self.conditions.push(Condition::Expr {
            template,
            tags,
            values,
            glue: Glue::And,
        });
    }

    /// Add a condition AND-glued to the previous one
    pub fn and_(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.mutate(|stmt| {
            stmt.set_last_glue(Glue::And);
            stmt.push_condition(field, value);
        })
    }

    /// Add a condition OR-glued to the previous one
    pub fn or_(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.mutate(|stmt| {
            stmt.set_last_glue(Glue::Or);
            stmt.push_condition(field, value);
        })
    }

    fn set_last_glue(&mut self, glue: Glue) {
        if let Some(last) = self.conditions.last_mut() {
            last.set_glue(glue);
        }
    }

    fn push_condition(&mut self, field: &str, value: Value) {
        let placeholders = scan_placeholders(field);
        if !placeholders.is_empty() {
            self.conditions.push(Condition::Expr {
                template: field.to_string(),
                tags: placeholders.into_iter().map(|p| p.tag).collect(),
                values: vec![value],
                glue: Glue::And,
            });
            return;
        }
        let (field, operator) = split_field_operator(field);
        self.conditions.push(Condition::Simple {
            field,
            operator,
            value,
            glue: Glue::And,
        });
    }

    /// Open a conditional scope; mutators are ignored while the
    /// innermost scope condition is false
    pub fn if_(&mut self, condition: bool) -> &mut Self {
        self.scope_stack.push(condition);
        self
    }

    /// Invert the innermost conditional scope
    pub fn else_(&mut self) -> Result<&mut Self> {
        match self.scope_stack.pop() {
            Some(active) => {
                self.scope_stack.push(!active);
                Ok(self)
            }
            None => Err(Error::invalid_argument("else_() without a matching if_()")),
        }
    }

    /// Close the innermost conditional scope
    pub fn end(&mut self) -> Result<&mut Self> {
        match self.scope_stack.pop() {
            Some(_) => Ok(self),
            None => Err(Error::invalid_argument("end() without a matching if_()")),
        }
    }

    /// Append an ORDER BY entry in backend default direction
    pub fn order(&mut self, field: &str) -> &mut Self {
        let field = field.to_string();
        self.mutate(|stmt| {
            stmt.random_order = false;
            stmt.sorting.push((field, None));
        })
    }

    /// Append an ORDER BY entry with an explicit direction
    pub fn order_by(&mut self, field: &str, direction: SortDirection) -> &mut Self {
        let field = field.to_string();
        self.mutate(|stmt| {
            stmt.random_order = false;
            stmt.sorting.push((field, Some(direction)));
        })
    }

    /// Order rows randomly, using the backend's random expression
    pub fn rand(&mut self) -> &mut Self {
        self.mutate(|stmt| {
            stmt.sorting.clear();
            stmt.random_order = true;
        })
    }

    pub fn group_by(&mut self, expression: &str) -> &mut Self {
        let expression = expression.to_string();
        self.mutate(|stmt| {
            stmt.grouping = Some((expression, None));
        })
    }

    pub fn having(&mut self, condition: &str) -> &mut Self {
        let condition = condition.to_string();
        self.mutate(|stmt| {
            if let Some((_, having)) = stmt.grouping.as_mut() {
                *having = Some(condition);
            }
        })
    }

    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join_with(JoinKind::Inner, table, on)
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join_with(JoinKind::Left, table, on)
    }

    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join_with(JoinKind::Right, table, on)
    }

    fn join_with(&mut self, kind: JoinKind, table: &str, on: &str) -> &mut Self {
        let table = table.to_string();
        let on = on.to_string();
        self.mutate(|stmt| {
            stmt.join = Some(Join { kind, table, on });
        })
    }

    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.mutate(|stmt| {
            stmt.limit = Some(count);
        })
    }

    /// Skip the first `count` rows. Meaningful on SELECT only; other
    /// kinds log a warning and ignore it.
    pub fn offset(&mut self, count: u64) -> &mut Self {
        self.mutate(|stmt| {
            if stmt.kind == StatementKind::Select {
                stmt.offset = Some(count);
            } else {
                tracing::warn!(
                    table = %stmt.source,
                    "offset is ignored on non-SELECT statements"
                );
            }
        })
    }

    /// Set a column value for INSERT or UPDATE. Later calls for the
    /// same column replace the earlier value.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let column = column.to_string();
        let value = value.into();
        self.mutate(|stmt| {
            stmt.values.insert(column, value);
        })
    }

    /// Set several column values at once
    pub fn data<I, S, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.mutate(|stmt| {
            for (column, value) in values {
                stmt.values.insert(column.into(), value.into());
            }
        })
    }

    /// Subquery statements referenced directly by this statement's
    /// conditions and values
    pub(crate) fn collect_subqueries(&self) -> Vec<SharedStatement> {
        fn collect_value(value: &Value, out: &mut Vec<SharedStatement>) {
            match value {
                Value::Subquery(shared) => out.push(shared.clone()),
                Value::Array(items) => {
                    for item in items {
                        collect_value(item, out);
                    }
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        for cond in &self.conditions {
            match cond {
                Condition::Simple { value, .. } => collect_value(value, &mut out),
                Condition::Expr { values, .. } => {
                    for value in values {
                        collect_value(value, &mut out);
                    }
                }
            }
        }
        for value in self.values.values() {
            collect_value(value, &mut out);
        }
        out
    }

    /// Render the statement to SQL without executing it
    pub fn to_sql(&self) -> Result<String> {
        if has_circular_references(self) {
            return Err(Error::CircularReference);
        }
        let driver = self.conn.driver();
        Parser::new(self, driver.as_ref()).parse()
    }

    /// Execute the statement against the backend.
    ///
    /// A statement already performed since its last mutation reuses the
    /// cached result set and does not touch the backend again.
    pub fn run(&mut self) -> Result<()> {
        if self.performed && self.cached_result.is_some() {
            return Ok(());
        }
        let sql = self.to_sql()?;
        let start = Instant::now();
        match self.conn.execute(&sql) {
            Ok(handle) => {
                let elapsed = start.elapsed();
                self.performed = true;
                self.cached_result = Some(handle);
                self.elapsed = Some(elapsed);
                self.executions += 1;
                tracing::debug!(%sql, ?elapsed, "statement executed");
                self.conn.notify(
                    &EventSubject {
                        sql: Some(&sql),
                        elapsed: Some(elapsed),
                    },
                    self.kind.event() | Event::QUERY,
                );
                Ok(())
            }
            Err(err) => {
                let err = err.with_sql(&sql);
                tracing::error!(%sql, error = %err, "statement failed");
                self.conn.notify(
                    &EventSubject {
                        sql: Some(&sql),
                        elapsed: None,
                    },
                    Event::EXCEPTION,
                );
                Err(err)
            }
        }
    }

    /// Iterate the rows of a SELECT, executing it first if needed
    pub fn rows(&mut self) -> Result<Cursor<'_>> {
        if self.kind != StatementKind::Select {
            return Err(Error::invalid_argument(
                "only SELECT statements produce rows",
            ));
        }
        Cursor::new(self)
    }

    /// Collect all rows of a SELECT
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.rows()?.collect()
    }

    /// Fetch the first row of a SELECT, or `None` for an empty result
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        let mut cursor = self.rows()?;
        cursor.next().transpose()
    }

    /// Rows changed by an INSERT, UPDATE or DELETE, executing it first
    /// if needed
    pub fn affected_rows(&mut self) -> Result<u64> {
        if self.kind == StatementKind::Select {
            return Err(Error::invalid_argument(
                "SELECT statements do not report affected rows",
            ));
        }
        self.run()?;
        self.conn.driver_mut().affected_rows()
    }

    /// Row id generated by an INSERT, executing it first if needed
    pub fn last_insert_id(&mut self) -> Result<i64> {
        if self.kind != StatementKind::Insert {
            return Err(Error::invalid_argument(
                "only INSERT statements report a generated id",
            ));
        }
        self.run()?;
        self.conn.driver_mut().last_insert_id()
    }

    /// Primary key column of the statement's table, resolved through
    /// the connection's metadata cache. An empty cached entry marks a
    /// table known to have no primary key.
    pub fn primary_key(&mut self) -> Result<Option<String>> {
        let key = format!("{}_primary_key", self.source);
        if let Some(cached) = self.conn.cache_fetch(&key) {
            return Ok(if cached.is_empty() { None } else { Some(cached) });
        }
        let pk = self.conn.driver_mut().primary_key_of(&self.source)?;
        self.conn.cache_store(&key, pk.as_deref().unwrap_or(""));
        Ok(pk)
    }

    /// Declared column types of the statement's table, cached on the
    /// connection as serialized JSON
    pub fn column_types(&mut self) -> Result<HashMap<String, String>> {
        let key = format!("{}_column_types", self.source);
        if let Some(cached) = self.conn.cache_fetch(&key) {
            if let Ok(types) = serde_json::from_str(&cached) {
                return Ok(types);
            }
        }
        self.run()?;
        let handle = self
            .cached_result
            .ok_or_else(|| Error::invalid_argument("statement produced no result set"))?;
        let types = self.conn.driver_mut().column_types_of(handle, &self.source)?;
        if let Ok(serialized) = serde_json::to_string(&types) {
            self.conn.cache_store(&key, &serialized);
        }
        Ok(types)
    }

    /// Wrap the statement for use as a subquery value
    pub fn into_shared(self) -> SharedStatement {
        Rc::new(RefCell::new(self))
    }
}

impl Clone for Statement {
    // The clone starts unperformed: execution state and the cached
    // result handle stay with the original.
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            source: self.source.clone(),
            columns: self.columns.clone(),
            conditions: self.conditions.clone(),
            sorting: self.sorting.clone(),
            random_order: self.random_order,
            grouping: self.grouping.clone(),
            join: self.join.clone(),
            limit: self.limit,
            offset: self.offset,
            values: self.values.clone(),
            scope_stack: self.scope_stack.clone(),
            performed: false,
            cached_result: None,
            elapsed: None,
            executions: 0,
            conn: self.conn.clone(),
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Some(handle) = self.cached_result.take() {
            self.conn.free_result(handle);
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("conditions", &self.conditions.len())
            .field("performed", &self.performed)
            .field("executions", &self.executions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::dialect::Dialect;
    use crate::driver::mock::MockDriver;
    use crate::driver::Config;
    use crate::events::Observer;

    fn connect() -> (Connection, Rc<RefCell<Vec<String>>>) {
        let driver = MockDriver::new();
        let log = driver.executed.clone();
        let conn = Connection::open(driver, &Config::new()).unwrap();
        (conn, log)
    }

    fn connect_with(driver: MockDriver) -> (Connection, Rc<RefCell<Vec<String>>>) {
        let log = driver.executed.clone();
        let conn = Connection::open(driver, &Config::new()).unwrap();
        (conn, log)
    }

    #[test]
    fn test_select_renders_full_clause_order() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("age >", 18)
            .order("name")
            .limit(10)
            .offset(5);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE age > 18 ORDER BY name LIMIT 10 OFFSET 5;"
        );
    }

    #[test]
    fn test_delete_renders() {
        let (conn, _) = connect();
        let mut stmt = conn.delete("users");
        stmt.where_("id", 5);
        assert_eq!(stmt.to_sql().unwrap(), "DELETE FROM users WHERE id = 5;");
    }

    #[test]
    fn test_to_sql_is_deterministic() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["id", "name"], "users");
        stmt.where_("age >", 18).or_("admin", true).order("name");
        let first = stmt.to_sql().unwrap();
        assert_eq!(stmt.to_sql().unwrap(), first);
    }

    #[test]
    fn test_run_twice_executes_once() {
        let (conn, log) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.run().unwrap();
        stmt.run().unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(stmt.executed_count(), 1);
    }

    #[test]
    fn test_mutation_invalidates_cached_result() {
        let (conn, log) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.run().unwrap();
        assert!(stmt.performed());
        stmt.where_("id", 1);
        assert!(!stmt.performed());
        stmt.run().unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_if_false_skips_mutators() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.if_(false)
            .where_("deleted", false)
            .end()
            .unwrap();
        assert_eq!(stmt.to_sql().unwrap(), "SELECT * FROM users;");
    }

    #[test]
    fn test_else_inverts_scope() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.if_(false).limit(1);
        stmt.else_().unwrap().limit(2);
        stmt.end().unwrap();
        assert_eq!(stmt.to_sql().unwrap(), "SELECT * FROM users LIMIT 2;");
    }

    #[test]
    fn test_unbalanced_scope_errors() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        assert!(stmt.end().is_err());
        assert!(stmt.else_().is_err());
    }

    #[test]
    fn test_nested_scopes_gate_inner_mutators() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.if_(true).if_(false).limit(1);
        stmt.end().unwrap();
        stmt.limit(3);
        stmt.end().unwrap();
        assert_eq!(stmt.to_sql().unwrap(), "SELECT * FROM users LIMIT 3;");
    }

    #[test]
    fn test_and_or_set_previous_glue() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("age >", 18).or_("admin", true).and_("active", true);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE age > 18 OR admin = 1 AND active = 1;"
        );
    }

    #[test]
    fn test_null_conditions() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("deleted_at", Value::Null).and_("email !=", Value::Null);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE deleted_at IS NULL AND email IS NOT NULL;"
        );
    }

    #[test]
    fn test_array_condition_renders_in() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("id", vec![1, 2, 3]);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE id IN (1, 2, 3);"
        );
    }

    #[test]
    fn test_expression_condition_substitutes_placeholders() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_expr(
            "LENGTH(name) > %i AND city = %s",
            vec![Value::Int(3), Value::Text("Oslo".to_string())],
        );
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE LENGTH(name) > 3 AND city = 'Oslo';"
        );
    }

    #[test]
    fn test_expression_parity_mismatch_fails_at_parse() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_expr("a = %i AND b = %s", vec![Value::Int(1)]);
        assert!(matches!(
            stmt.to_sql().unwrap_err(),
            Error::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_or_expr_glues_previous_condition() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("active", true)
            .or_expr("age BETWEEN %i AND %i", vec![Value::Int(18), Value::Int(30)]);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE active = 1 OR age BETWEEN 18 AND 30;"
        );
    }

    #[test]
    fn test_inner_join_renders() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.inner_join("orders", "orders.user_id = users.id");
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users INNER JOIN orders ON orders.user_id = users.id;"
        );
    }

    #[test]
    fn test_insert_renders_sorted_columns() {
        let (conn, _) = connect();
        let mut stmt = conn.insert("users");
        stmt.set("name", "John").set("age", 30);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "INSERT INTO users (age, name) VALUES (30, 'John');"
        );
    }

    #[test]
    fn test_update_renders() {
        let (conn, _) = connect();
        let mut stmt = conn.update("users");
        stmt.set("name", "Jane").where_("id", 7);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "UPDATE users SET name = 'Jane' WHERE id = 7;"
        );
    }

    #[test]
    fn test_update_limit_omitted_without_dialect_support() {
        let (conn, _) = connect();
        let mut stmt = conn.delete("logs");
        stmt.order("id").limit(100);
        assert_eq!(stmt.to_sql().unwrap(), "DELETE FROM logs;");
    }

    #[test]
    fn test_update_limit_rendered_when_supported() {
        let (conn, _) =
            connect_with(MockDriver::with_dialect(Dialect::mysql()));
        let mut stmt = conn.delete("logs");
        stmt.order("id").limit(100);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "DELETE FROM logs ORDER BY id LIMIT 100;"
        );
    }

    #[test]
    fn test_offset_ignored_on_mutations() {
        let (conn, _) =
            connect_with(MockDriver::with_dialect(Dialect::mysql()));
        let mut stmt = conn.delete("logs");
        stmt.limit(10).offset(5);
        assert_eq!(stmt.to_sql().unwrap(), "DELETE FROM logs LIMIT 10;");
    }

    #[test]
    fn test_subquery_renders_parenthesized() {
        let (conn, _) = connect();
        let inner = {
            let mut sub = conn.select(&["id"], "banned");
            sub.where_("until >", "2024-01-01");
            sub.into_shared()
        };
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("id", &inner);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE id IN (SELECT id FROM banned WHERE until > '2024-01-01');"
        );
    }

    #[test]
    fn test_circular_subquery_fails_before_backend() {
        let (conn, log) = connect();
        let a = conn.select(&["*"], "a").into_shared();
        let b = conn.select(&["*"], "b").into_shared();
        a.borrow_mut().where_("id", &b);
        b.borrow_mut().where_("id", &a);

        let err = a.borrow_mut().run().unwrap_err();
        assert!(matches!(err, Error::CircularReference));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_self_referencing_subquery_fails() {
        let (conn, _) = connect();
        let stmt = conn.select(&["*"], "users").into_shared();
        let clone = stmt.clone();
        stmt.borrow_mut().where_("id", &clone);
        assert!(matches!(
            stmt.borrow_mut().run().unwrap_err(),
            Error::CircularReference
        ));
    }

    #[test]
    fn test_rand_uses_dialect_expression() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.rand().limit(1);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users ORDER BY RANDOM() LIMIT 1;"
        );
    }

    #[test]
    fn test_group_by_and_having() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["city", "COUNT(*)"], "users");
        stmt.group_by("city").having("COUNT(*) > 5");
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT city, COUNT(*) FROM users GROUP BY city HAVING COUNT(*) > 5;"
        );
    }

    #[test]
    fn test_right_join_emulated_on_sqlite() {
        let (conn, _) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.right_join("orders", "orders.user_id = users.id");
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM orders LEFT JOIN users ON orders.user_id = users.id;"
        );
    }

    #[test]
    fn test_right_join_native_on_mysql() {
        let (conn, _) =
            connect_with(MockDriver::with_dialect(Dialect::mysql()));
        let mut stmt = conn.select(&["*"], "users");
        stmt.right_join("orders", "orders.user_id = users.id");
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users RIGHT JOIN orders ON orders.user_id = users.id;"
        );
    }

    #[test]
    fn test_top_wrapping_on_mssql() {
        let (conn, _) =
            connect_with(MockDriver::with_dialect(Dialect::mssql()));
        let mut stmt = conn.select(&["*"], "users");
        stmt.limit(10);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT TOP 10 * FROM (SELECT * FROM users);"
        );
    }

    #[test]
    fn test_top_style_rejects_offset() {
        let (conn, _) =
            connect_with(MockDriver::with_dialect(Dialect::mssql()));
        let mut stmt = conn.select(&["*"], "users");
        stmt.limit(10).offset(5);
        assert!(matches!(
            stmt.to_sql().unwrap_err(),
            Error::Unsupported { .. }
        ));
    }

    #[test]
    fn test_last_insert_id_rejected_outside_insert() {
        let (conn, _) = connect();
        let mut stmt = conn.update("users");
        stmt.set("name", "x");
        assert!(stmt.last_insert_id().is_err());
    }

    #[test]
    fn test_affected_rows_runs_mutation() {
        let (conn, log) = connect();
        let mut stmt = conn.delete("users");
        stmt.where_("id", 1);
        assert_eq!(stmt.affected_rows().unwrap(), 3);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_clone_resets_execution_state() {
        let (conn, log) = connect();
        let mut stmt = conn.select(&["*"], "users");
        stmt.run().unwrap();
        let mut copy = stmt.clone();
        assert!(!copy.performed());
        assert_eq!(copy.executed_count(), 0);
        copy.run().unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_primary_key_uses_cache() {
        let mut driver = MockDriver::new();
        driver.primary_key = Some("id".to_string());
        let lookups = driver.pk_lookups.clone();
        let conn = Connection::open_with_cache(
            driver,
            &Config::new(),
            crate::driver::MemoryCache::new(),
        )
        .unwrap();
        let mut stmt = conn.select(&["*"], "users");
        assert_eq!(stmt.primary_key().unwrap(), Some("id".to_string()));
        assert_eq!(stmt.primary_key().unwrap(), Some("id".to_string()));
        assert_eq!(*lookups.borrow(), 1);
    }

    #[test]
    fn test_failed_run_notifies_exception_and_carries_sql() {
        struct ErrorTap {
            events: Rc<RefCell<Vec<u32>>>,
        }
        impl Observer for ErrorTap {
            fn notify(&self, _: &EventSubject<'_>, event: Event) {
                self.events.borrow_mut().push(event.bits());
            }
        }

        let mut driver = MockDriver::new();
        driver.fail_next = true;
        let (conn, _) = connect_with(driver);
        let events = Rc::new(RefCell::new(Vec::new()));
        conn.attach_observer(
            Rc::new(ErrorTap {
                events: events.clone(),
            }),
            Event::EXCEPTION,
        );

        let mut stmt = conn.select(&["*"], "users");
        let err = stmt.run().unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM users;"));
        assert_eq!(*events.borrow(), vec![Event::EXCEPTION.bits()]);
    }

    #[test]
    fn test_repeat_run_does_not_renotify() {
        struct Counter {
            count: Rc<RefCell<u32>>,
        }
        impl Observer for Counter {
            fn notify(&self, _: &EventSubject<'_>, _: Event) {
                *self.count.borrow_mut() += 1;
            }
        }

        let (conn, _) = connect();
        let count = Rc::new(RefCell::new(0));
        conn.attach_observer(
            Rc::new(Counter {
                count: count.clone(),
            }),
            Event::SELECT,
        );
        let mut stmt = conn.select(&["*"], "users");
        stmt.run().unwrap();
        stmt.run().unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_split_field_operator() {
        assert_eq!(
            split_field_operator("age >"),
            ("age".to_string(), Some(">".to_string()))
        );
        assert_eq!(
            split_field_operator("name like"),
            ("name".to_string(), Some("LIKE".to_string()))
        );
        assert_eq!(split_field_operator("age"), ("age".to_string(), None));
    }
}
