//! Renders statements to SQL text for a concrete driver dialect

use std::collections::HashSet;

use crate::condition::{scan_placeholders, Condition};
use crate::dialect::LimitStyle;
use crate::driver::Driver;
use crate::statement::{JoinKind, SharedStatement, Statement, StatementKind};
use crate::value::{TypeTag, Value};
use crate::{Error, Result};

/// Walk the subquery graph looking for a reference back to a statement
/// already on the current path.
///
/// A statement that cannot be borrowed during the walk is one the
/// caller is currently executing, which is the same cycle in a
/// different coat, so it counts too.
pub(crate) fn has_circular_references(root: &Statement) -> bool {
    let mut path: HashSet<*const std::cell::RefCell<Statement>> = HashSet::new();
    let mut frames: Vec<(Vec<SharedStatement>, usize)> = vec![(root.collect_subqueries(), 0)];
    let mut nodes: Vec<Option<SharedStatement>> = vec![None];

    while let Some((children, idx)) = frames.last_mut() {
        if *idx >= children.len() {
            frames.pop();
            if let Some(Some(node)) = nodes.pop() {
                path.remove(&std::rc::Rc::as_ptr(&node));
            }
            continue;
        }
        let child = children[*idx].clone();
        *idx += 1;

        let ptr = std::rc::Rc::as_ptr(&child);
        if path.contains(&ptr) {
            return true;
        }
        let Ok(borrowed) = child.try_borrow() else {
            return true;
        };
        let grandchildren = borrowed.collect_subqueries();
        drop(borrowed);
        path.insert(ptr);
        frames.push((grandchildren, 0));
        nodes.push(Some(child));
    }
    false
}

pub(crate) struct Parser<'a> {
    stmt: &'a Statement,
    driver: &'a dyn Driver,
}

impl<'a> Parser<'a> {
    pub fn new(stmt: &'a Statement, driver: &'a dyn Driver) -> Self {
        Self { stmt, driver }
    }

    /// Render the complete statement, terminated with a semicolon
    pub fn parse(&self) -> Result<String> {
        Ok(format!("{};", self.parse_statement(self.stmt)?))
    }

    fn parse_statement(&self, stmt: &Statement) -> Result<String> {
        match stmt.kind {
            StatementKind::Select => self.parse_select(stmt),
            StatementKind::Insert => self.parse_insert(stmt),
            StatementKind::Update => self.parse_update(stmt),
            StatementKind::Delete => self.parse_delete(stmt),
        }
    }

    fn parse_select(&self, stmt: &Statement) -> Result<String> {
        let columns = stmt.columns.join(", ");
        let (source, join) = self.render_source(stmt);
        let mut sql = format!("SELECT {columns} FROM {source}{join}");
        sql.push_str(&self.render_conditions(stmt)?);
        sql.push_str(&self.render_grouping(stmt));
        sql.push_str(&self.render_order(stmt));
        self.apply_limit(sql, stmt)
    }

    fn parse_insert(&self, stmt: &Statement) -> Result<String> {
        if stmt.values.is_empty() {
            return Err(Error::invalid_argument("INSERT statement has no values"));
        }
        let columns: Vec<&str> = stmt.values.keys().map(String::as_str).collect();
        let mut literals = Vec::with_capacity(stmt.values.len());
        for value in stmt.values.values() {
            literals.push(self.literal(value)?);
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            stmt.source,
            columns.join(", "),
            literals.join(", ")
        ))
    }

    fn parse_update(&self, stmt: &Statement) -> Result<String> {
        if stmt.values.is_empty() {
            return Err(Error::invalid_argument("UPDATE statement has no values"));
        }
        let mut assignments = Vec::with_capacity(stmt.values.len());
        for (column, value) in &stmt.values {
            assignments.push(format!("{column} = {}", self.literal(value)?));
        }
        let mut sql = format!("UPDATE {} SET {}", stmt.source, assignments.join(", "));
        sql.push_str(&self.render_conditions(stmt)?);
        self.apply_mutation_limit(sql, stmt)
    }

    fn parse_delete(&self, stmt: &Statement) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", stmt.source);
        sql.push_str(&self.render_conditions(stmt)?);
        self.apply_mutation_limit(sql, stmt)
    }

    /// Driving table plus join clause. Backends without native RIGHT
    /// JOIN get the tables swapped and a LEFT JOIN instead.
    fn render_source(&self, stmt: &Statement) -> (String, String) {
        match &stmt.join {
            Some(join)
                if join.kind == JoinKind::Right && !self.driver.dialect().native_right_join() =>
            {
                (
                    join.table.clone(),
                    format!(" LEFT JOIN {} ON {}", stmt.source, join.on),
                )
            }
            Some(join) => (
                stmt.source.clone(),
                format!(" {} {} ON {}", join.kind.keyword(), join.table, join.on),
            ),
            None => (stmt.source.clone(), String::new()),
        }
    }

    fn render_conditions(&self, stmt: &Statement) -> Result<String> {
        if stmt.conditions.is_empty() {
            return Ok(String::new());
        }
        let mut sql = String::from(" WHERE ");
        for (i, cond) in stmt.conditions.iter().enumerate() {
            if i > 0 {
                // glue lives on the preceding condition
                sql.push(' ');
                sql.push_str(stmt.conditions[i - 1].glue().as_str());
                sql.push(' ');
            }
            sql.push_str(&self.render_condition(cond)?);
        }
        Ok(sql)
    }

    fn render_condition(&self, cond: &Condition) -> Result<String> {
        cond.validate()?;
        match cond {
            Condition::Simple {
                field,
                operator,
                value,
                ..
            } => self.render_simple(field, operator.as_deref(), value),
            Condition::Expr {
                template, values, ..
            } => self.render_expression(template, values),
        }
    }

    fn render_simple(&self, field: &str, operator: Option<&str>, value: &Value) -> Result<String> {
        if value.is_null() {
            return Ok(match operator {
                None | Some("=") | Some("IS") => format!("{field} IS NULL"),
                Some("!=") | Some("<>") => format!("{field} IS NOT NULL"),
                Some(op) => format!("{field} {op} NULL"),
            });
        }
        let operator = match operator {
            Some(op) => op,
            None => match value {
                Value::Array(_) | Value::Subquery(_) => "IN",
                _ => "=",
            },
        };
        Ok(format!("{field} {operator} {}", self.literal(value)?))
    }

    fn render_expression(&self, template: &str, values: &[Value]) -> Result<String> {
        let mut sql = String::with_capacity(template.len());
        let mut cursor = 0;
        for (placeholder, value) in scan_placeholders(template).iter().zip(values) {
            sql.push_str(&template[cursor..placeholder.start]);
            let rendered = match placeholder.tag {
                TypeTag::Subquery => match value {
                    Value::Subquery(shared) => format!("({})", self.subquery_sql(shared)?),
                    other => {
                        return Err(Error::invalid_argument(format!(
                            "%sub placeholder requires a subquery value, got {other:?}"
                        )))
                    }
                },
                tag => self.driver.escape(value, tag)?,
            };
            sql.push_str(&rendered);
            cursor = placeholder.start + placeholder.len;
        }
        sql.push_str(&template[cursor..]);
        Ok(sql)
    }

    /// Render a value as a literal, inferring its tag from its shape
    fn literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Subquery(shared) => Ok(format!("({})", self.subquery_sql(shared)?)),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.literal(item)?);
                }
                Ok(format!("({})", parts.join(", ")))
            }
            other => match other.type_tag() {
                Some(tag) => self.driver.escape(other, tag),
                None => Ok("NULL".to_string()),
            },
        }
    }

    // Cycles are rejected before parsing starts; a borrow conflict here
    // means the graph changed under us and is treated the same way.
    fn subquery_sql(&self, shared: &SharedStatement) -> Result<String> {
        let stmt = shared
            .try_borrow()
            .map_err(|_| Error::CircularReference)?;
        self.parse_statement(&stmt)
    }

    fn render_grouping(&self, stmt: &Statement) -> String {
        match &stmt.grouping {
            Some((expression, Some(having))) => {
                format!(" GROUP BY {expression} HAVING {having}")
            }
            Some((expression, None)) => format!(" GROUP BY {expression}"),
            None => String::new(),
        }
    }

    fn render_order(&self, stmt: &Statement) -> String {
        if stmt.random_order {
            return format!(" ORDER BY {}", self.driver.dialect().random_order());
        }
        if stmt.sorting.is_empty() {
            return String::new();
        }
        let entries: Vec<String> = stmt
            .sorting
            .iter()
            .map(|(field, direction)| match direction {
                Some(dir) => format!("{field} {dir}"),
                None => field.clone(),
            })
            .collect();
        format!(" ORDER BY {}", entries.join(", "))
    }

    fn apply_limit(&self, sql: String, stmt: &Statement) -> Result<String> {
        match self.driver.dialect().limit_style() {
            LimitStyle::Native => {
                let mut sql = sql;
                if let Some(limit) = stmt.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                    if let Some(offset) = stmt.offset {
                        sql.push_str(&format!(" OFFSET {offset}"));
                    }
                }
                Ok(sql)
            }
            LimitStyle::Top => {
                if stmt.offset.is_some() {
                    return Err(Error::unsupported(
                        "this backend cannot offset result sets",
                    ));
                }
                match stmt.limit {
                    Some(limit) => Ok(format!("SELECT TOP {limit} * FROM ({sql})")),
                    None => Ok(sql),
                }
            }
            LimitStyle::Unsupported => {
                if stmt.limit.is_some() || stmt.offset.is_some() {
                    return Err(Error::unsupported(
                        "this backend cannot limit result sets",
                    ));
                }
                Ok(sql)
            }
        }
    }

    /// ORDER BY and LIMIT on UPDATE/DELETE, for dialects that allow
    /// them. Other dialects silently drop both clauses.
    fn apply_mutation_limit(&self, sql: String, stmt: &Statement) -> Result<String> {
        let dialect = self.driver.dialect();
        if !dialect.row_limited_mutations() {
            return Ok(sql);
        }
        if dialect.limit_style() != LimitStyle::Native && stmt.limit.is_some() {
            return Err(Error::unsupported(
                "this backend cannot limit UPDATE or DELETE statements",
            ));
        }
        let mut sql = sql;
        sql.push_str(&self.render_order(stmt));
        if let Some(limit) = stmt.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::dialect::Dialect;
    use crate::driver::mock::MockDriver;
    use crate::driver::Config;

    fn connect(dialect: Dialect) -> Connection {
        Connection::open(MockDriver::with_dialect(dialect), &Config::new()).unwrap()
    }

    #[test]
    fn test_no_cycle_in_nested_subqueries() {
        let conn = connect(Dialect::sqlite());
        let inner = conn.select(&["id"], "a").into_shared();
        let middle = {
            let mut stmt = conn.select(&["id"], "b");
            stmt.where_("a_id", &inner);
            stmt.into_shared()
        };
        let mut outer = conn.select(&["*"], "c");
        outer.where_("b_id", &middle);
        assert!(!has_circular_references(&outer));
        assert_eq!(
            outer.to_sql().unwrap(),
            "SELECT * FROM c WHERE b_id IN (SELECT id FROM b WHERE a_id IN (SELECT id FROM a));"
        );
    }

    #[test]
    fn test_diamond_sharing_is_not_a_cycle() {
        let conn = connect(Dialect::sqlite());
        let shared = conn.select(&["id"], "common").into_shared();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_("a", &shared).and_("b", &shared);
        assert!(stmt.to_sql().is_ok());
    }

    #[test]
    fn test_deep_cycle_detected() {
        let conn = connect(Dialect::sqlite());
        let a = conn.select(&["*"], "a").into_shared();
        let b = conn.select(&["*"], "b").into_shared();
        let c = conn.select(&["*"], "c").into_shared();
        a.borrow_mut().where_("x", &b);
        b.borrow_mut().where_("x", &c);
        c.borrow_mut().where_("x", &a);
        assert!(has_circular_references(&a.borrow()));
    }

    #[test]
    fn test_subquery_in_expression_placeholder() {
        let conn = connect(Dialect::sqlite());
        let sub = conn.select(&["id"], "banned").into_shared();
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_expr("id NOT IN %sub", vec![Value::Subquery(sub)]);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE id NOT IN (SELECT id FROM banned);"
        );
    }

    #[test]
    fn test_sub_placeholder_rejects_scalar() {
        let conn = connect(Dialect::sqlite());
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_expr("id IN %sub", vec![Value::Int(1)]);
        assert!(matches!(
            stmt.to_sql().unwrap_err(),
            Error::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_identifier_placeholder_quotes() {
        let conn = connect(Dialect::mysql());
        let mut stmt = conn.select(&["*"], "users");
        stmt.where_expr("%l = 1", vec![Value::Text("users.active".to_string())]);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "SELECT * FROM users WHERE `users`.`active` = 1;"
        );
    }

    #[test]
    fn test_insert_with_null_and_subquery_values() {
        let conn = connect(Dialect::sqlite());
        let sub = conn.select(&["MAX(rank)"], "users").into_shared();
        let mut stmt = conn.insert("users");
        stmt.set("nickname", Value::Null).set("rank", &sub);
        assert_eq!(
            stmt.to_sql().unwrap(),
            "INSERT INTO users (nickname, rank) VALUES (NULL, (SELECT MAX(rank) FROM users));"
        );
    }

    #[test]
    fn test_empty_insert_rejected() {
        let conn = connect(Dialect::sqlite());
        let mut stmt = conn.insert("users");
        assert!(matches!(
            stmt.to_sql().unwrap_err(),
            Error::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_inexpressible_mutation_limit_rejected() {
        // TOP-style limiting cannot wrap a DELETE, so allowing limited
        // mutations on such a dialect must fail loudly
        let conn = connect(Dialect::mssql().with_row_limited_mutations(true));
        let mut stmt = conn.delete("logs");
        stmt.limit(5);
        assert!(matches!(
            stmt.to_sql().unwrap_err(),
            Error::Unsupported { .. }
        ));
    }
}
