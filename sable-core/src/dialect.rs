//! Backend SQL dialect capabilities and value escaping.
//!
//! A [`Dialect`] is a plain capability record: how a backend spells its
//! LIMIT clause, whether it supports RIGHT JOIN natively, how it quotes
//! identifiers and booleans. Drivers hand one to the parser; the parser
//! never matches on backend names.

use crate::value::{TypeTag, Value};
use crate::{Error, Result};

/// The strategy a backend offers for row limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `LIMIT n [OFFSET m]` appended to the statement
    Native,
    /// `SELECT TOP n * FROM (...)` wrapping, no offset support
    Top,
    /// The backend cannot limit result sets
    Unsupported,
}

/// Capability record describing one backend's SQL surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    name: &'static str,
    limit_style: LimitStyle,
    row_limited_mutations: bool,
    native_right_join: bool,
    random_order: &'static str,
    true_literal: &'static str,
    false_literal: &'static str,
    identifier_quotes: (&'static str, &'static str),
}

impl Dialect {
    /// SQLite: bracket identifiers, no native RIGHT JOIN, and LIMIT on
    /// UPDATE/DELETE only when the library was built with that option.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite",
            limit_style: LimitStyle::Native,
            row_limited_mutations: false,
            native_right_join: false,
            random_order: "RANDOM()",
            true_literal: "1",
            false_literal: "0",
            identifier_quotes: ("[", "]"),
        }
    }

    pub fn mysql() -> Self {
        Self {
            name: "mysql",
            limit_style: LimitStyle::Native,
            row_limited_mutations: true,
            native_right_join: true,
            random_order: "RAND()",
            true_literal: "1",
            false_literal: "0",
            identifier_quotes: ("`", "`"),
        }
    }

    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            limit_style: LimitStyle::Native,
            row_limited_mutations: false,
            native_right_join: true,
            random_order: "RANDOM()",
            true_literal: "true",
            false_literal: "false",
            identifier_quotes: ("\"", "\""),
        }
    }

    pub fn mssql() -> Self {
        Self {
            name: "mssql",
            limit_style: LimitStyle::Top,
            row_limited_mutations: false,
            native_right_join: true,
            random_order: "NEWID()",
            true_literal: "1",
            false_literal: "0",
            identifier_quotes: ("[", "]"),
        }
    }

    /// Override whether UPDATE/DELETE accept ORDER BY and LIMIT clauses
    pub fn with_row_limited_mutations(mut self, enabled: bool) -> Self {
        self.row_limited_mutations = enabled;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit_style(&self) -> LimitStyle {
        self.limit_style
    }

    pub fn row_limited_mutations(&self) -> bool {
        self.row_limited_mutations
    }

    pub fn native_right_join(&self) -> bool {
        self.native_right_join
    }

    /// The expression used for `ORDER BY <random>`
    pub fn random_order(&self) -> &'static str {
        self.random_order
    }

    /// Quote an identifier, handling dotted paths piecewise.
    /// A closing quote inside a part is doubled.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.identifier_quotes;
        identifier
            .split('.')
            .map(|part| format!("{open}{}{close}", part.replace(close, &close.repeat(2))))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a value as a SQL literal under the given type tag.
    ///
    /// Subqueries are rendered upstream by the parser; reaching them
    /// here is a caller bug and reported as an invalid argument.
    pub fn escape(&self, value: &Value, tag: TypeTag) -> Result<String> {
        match (tag, value) {
            (TypeTag::Bool, Value::Bool(b)) => Ok(if *b {
                self.true_literal.to_string()
            } else {
                self.false_literal.to_string()
            }),
            (TypeTag::Int, Value::Int(i)) => Ok(i.to_string()),
            (TypeTag::Float, Value::Float(f)) => Ok(f.to_string()),
            (TypeTag::Float, Value::Int(i)) => Ok(i.to_string()),
            (TypeTag::Text, Value::Text(s)) => Ok(quote_text(s)),
            (TypeTag::Text, Value::Json(j)) => {
                let serialized = serde_json::to_string(j).map_err(|e| {
                    Error::invalid_argument(format!("cannot serialize json value: {e}"))
                })?;
                Ok(quote_text(&serialized))
            }
            (TypeTag::DateTime, Value::DateTime(dt)) => {
                Ok(dt.format("'%Y-%m-%d %H:%M:%S'").to_string())
            }
            (TypeTag::Binary, Value::Binary(bytes)) => {
                let mut hex = String::with_capacity(bytes.len() * 2);
                for byte in bytes {
                    hex.push_str(&format!("{byte:02X}"));
                }
                Ok(format!("X'{hex}'"))
            }
            (TypeTag::Identifier, Value::Text(s)) => Ok(self.quote_identifier(s)),
            (TypeTag::Array, Value::Array(items)) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let part = match item.type_tag() {
                        Some(item_tag) => self.escape(item, item_tag)?,
                        None => "NULL".to_string(),
                    };
                    parts.push(part);
                }
                Ok(format!("({})", parts.join(", ")))
            }
            (TypeTag::Subquery, _) => Err(Error::invalid_argument(
                "subqueries must be rendered by the statement parser",
            )),
            (tag, value) => Err(Error::invalid_argument(format!(
                "value {value:?} cannot be escaped as {}",
                tag.marker()
            ))),
        }
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
