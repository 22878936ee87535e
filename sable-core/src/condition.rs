//! Condition model shared by WHERE clauses

use std::fmt;

use crate::value::{TypeTag, Value};
use crate::{Error, Result};

/// How a condition attaches to the one that follows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Glue {
    #[default]
    And,
    Or,
}

impl Glue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Glue::And => "AND",
            Glue::Or => "OR",
        }
    }
}

/// Sort direction for ORDER BY entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One entry in a statement's condition list.
///
/// The glue stored on a condition describes how the NEXT condition
/// attaches to it; the first condition's glue is never rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field [operator] value`, with the operator inferred from the
    /// value shape when absent
    Simple {
        field: String,
        operator: Option<String>,
        value: Value,
        glue: Glue,
    },
    /// Free-form SQL fragment with typed placeholders
    Expr {
        template: String,
        tags: Vec<TypeTag>,
        values: Vec<Value>,
        glue: Glue,
    },
}

impl Condition {
    pub fn glue(&self) -> Glue {
        match self {
            Condition::Simple { glue, .. } | Condition::Expr { glue, .. } => *glue,
        }
    }

    pub fn set_glue(&mut self, new_glue: Glue) {
        match self {
            Condition::Simple { glue, .. } | Condition::Expr { glue, .. } => *glue = new_glue,
        }
    }

    /// Check marker/value parity for expression-form conditions
    pub fn validate(&self) -> Result<()> {
        if let Condition::Expr {
            template,
            tags,
            values,
            ..
        } = self
        {
            if tags.len() != values.len() {
                return Err(Error::invalid_argument(format!(
                    "expression '{}' has {} placeholder(s) but {} value(s)",
                    template,
                    tags.len(),
                    values.len()
                )));
            }
        }
        Ok(())
    }
}

/// A placeholder occurrence inside an expression template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub start: usize,
    pub len: usize,
    pub tag: TypeTag,
}

// Longest markers first so %bin and %sub win over %b and %s
const MARKERS: [(&str, TypeTag); 9] = [
    ("%bin", TypeTag::Binary),
    ("%sub", TypeTag::Subquery),
    ("%b", TypeTag::Bool),
    ("%i", TypeTag::Int),
    ("%f", TypeTag::Float),
    ("%s", TypeTag::Text),
    ("%d", TypeTag::DateTime),
    ("%a", TypeTag::Array),
    ("%l", TypeTag::Identifier),
];

/// Scan a template for typed placeholders, left to right, longest match first
pub fn scan_placeholders(template: &str) -> Vec<Placeholder> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] != b'%' {
            pos += 1;
            continue;
        }
        let rest = &template[pos..];
        match MARKERS.iter().find(|(m, _)| rest.starts_with(m)) {
            Some((marker, tag)) => {
                found.push(Placeholder {
                    start: pos,
                    len: marker.len(),
                    tag: *tag,
                });
                pos += marker.len();
            }
            None => pos += 1,
        }
    }
    found
}
