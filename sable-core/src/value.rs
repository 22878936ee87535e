//! Value and row types for SQL literals and results

use std::fmt;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;

use crate::statement::SharedStatement;
use crate::{Error, Result};

/// Semantic type tag attached to a value for escaping purposes.
///
/// Each tag maps to one placeholder marker in expression-form conditions
/// and determines the escaping rule a dialect applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// `%b` - boolean literal
    Bool,
    /// `%s` - quoted text
    Text,
    /// `%i` - integer literal
    Int,
    /// `%f` - float literal
    Float,
    /// `%d` - timestamp literal
    DateTime,
    /// `%bin` - binary blob
    Binary,
    /// `%l` - quoted identifier (column/table name)
    Identifier,
    /// `%sub` - nested statement
    Subquery,
    /// `%a` - parenthesized value list
    Array,
}

impl TypeTag {
    /// The placeholder marker recognized in condition templates
    pub fn marker(&self) -> &'static str {
        match self {
            TypeTag::Bool => "%b",
            TypeTag::Text => "%s",
            TypeTag::Int => "%i",
            TypeTag::Float => "%f",
            TypeTag::DateTime => "%d",
            TypeTag::Binary => "%bin",
            TypeTag::Identifier => "%l",
            TypeTag::Subquery => "%sub",
            TypeTag::Array => "%a",
        }
    }
}

/// A SQL value carried by a statement
#[derive(Clone)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Text value
    Text(String),
    /// Binary blob
    Binary(Vec<u8>),
    /// Timestamp value
    DateTime(NaiveDateTime),
    /// JSON value, rendered as quoted serialized text
    Json(serde_json::Value),
    /// List of values, rendered as `(v1, v2, ...)`
    Array(Vec<Value>),
    /// Nested statement, rendered as a parenthesized subquery
    Subquery(SharedStatement),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type tag inferred from the runtime shape of the value.
    ///
    /// `Null` has no tag; it renders as the `NULL` keyword everywhere.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Int(_) => Some(TypeTag::Int),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Text(_) => Some(TypeTag::Text),
            Value::Binary(_) => Some(TypeTag::Binary),
            Value::DateTime(_) => Some(TypeTag::DateTime),
            Value::Json(_) => Some(TypeTag::Text),
            Value::Array(_) => Some(TypeTag::Array),
            Value::Subquery(_) => Some(TypeTag::Subquery),
        }
    }

    /// Extract array items if this is an `Array` variant
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value` for typed row extraction.
    ///
    /// Subqueries have no JSON representation and map to `Null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => serde_json::Value::Array(
                b.iter()
                    .map(|byte| serde_json::Value::Number(serde_json::Number::from(*byte)))
                    .collect(),
            ),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            Value::Json(j) => j.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Subquery(_) => serde_json::Value::Null,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Value::DateTime(dt) => f.debug_tuple("DateTime").field(dt).finish(),
            Value::Json(j) => f.debug_tuple("Json").field(j).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            // Subquery graphs may be cyclic; never recurse into them here
            Value::Subquery(_) => write!(f, "Subquery(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Subqueries compare by identity, like the rest of the graph logic
            (Value::Subquery(a), Value::Subquery(b)) => std::rc::Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::Int(i64::from(val))
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::Int(val)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Value::Int(i64::from(val))
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::Float(f64::from(val))
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Float(val)
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::Text(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Text(val.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Binary(val)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(val: NaiveDateTime) -> Self {
        Value::DateTime(val)
    }
}

impl From<serde_json::Value> for Value {
    fn from(val: serde_json::Value) -> Self {
        Value::Json(val)
    }
}

impl From<SharedStatement> for Value {
    fn from(val: SharedStatement) -> Self {
        Value::Subquery(val)
    }
}

impl From<&SharedStatement> for Value {
    fn from(val: &SharedStatement) -> Self {
        Value::Subquery(val.clone())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(vals: Vec<T>) -> Self {
        Value::Array(vals.into_iter().map(|v| v.into()).collect())
    }
}

impl<T> From<&[T]> for Value
where
    T: Clone + Into<Value>,
{
    fn from(vals: &[T]) -> Self {
        Value::Array(vals.iter().cloned().map(|v| v.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// One result row: an ordered column name to value mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Later inserts with the same name shadow earlier ones
    /// on `get`, matching backend column-list order.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in backend order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Deserialize the row into a typed struct through its JSON shape
    pub fn deserialize<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for (name, value) in &self.columns {
            map.insert(name.clone(), value.to_json());
        }
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| Error::invalid_argument(format!("cannot deserialize row: {e}")))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_value_creation() {
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("hello"), Value::Text("hello".to_string()));
        assert_eq!(Value::from(()), Value::Null);
    }

    #[test]
    fn test_array_conversion() {
        let value = Value::from(vec![1, 2, 3]);
        assert_eq!(
            value,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(Some(42i64)), Value::Int(42));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::Int(42).type_tag(), Some(TypeTag::Int));
        assert_eq!(Value::Bool(true).type_tag(), Some(TypeTag::Bool));
        assert_eq!(
            Value::Array(vec![Value::Int(1)]).type_tag(),
            Some(TypeTag::Array)
        );
        assert_eq!(Value::Null.type_tag(), None);
    }

    #[test]
    fn test_markers() {
        assert_eq!(TypeTag::Binary.marker(), "%bin");
        assert_eq!(TypeTag::Subquery.marker(), "%sub");
        assert_eq!(TypeTag::Int.marker(), "%i");
    }

    #[test]
    fn test_row_get_and_order() {
        let mut row = Row::new();
        row.insert("id", 1i64);
        row.insert("name", "John");
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("missing"), None);
        let names: Vec<&str> = row.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_row_deserialize() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct User {
            id: i64,
            name: String,
        }

        let mut row = Row::new();
        row.insert("id", 7i64);
        row.insert("name", "Jane");
        let user: User = row.deserialize().unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "Jane".to_string()
            }
        );
    }

    #[test]
    fn test_datetime_json_format() {
        let dt = NaiveDateTime::parse_from_str("2024-05-01 12:30:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).to_json(),
            serde_json::Value::String("2024-05-01 12:30:00".to_string())
        );
    }
}
