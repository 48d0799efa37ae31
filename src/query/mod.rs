//! Search expressions over nested API responses.
//!
//! A [`Query`] is a compiled expression in a JMESPath subset: field access,
//! `[*]`/`*` wildcard projections, `[]` flattening, `[?cond]` filters,
//! `{key: expr}` object construction, backtick JSON literals, `'raw'`
//! strings, pipes, comparisons and a handful of functions.
//!
//! Compilation happens once, when a metric definition is loaded, so syntax
//! errors stop the process before any collection cycle runs. Evaluation
//! never fails on missing data: absent fields evaluate to `null` and
//! projections silently drop `null` results.
//!
//! ```rust
//! use huginn::query::Query;
//! use serde_json::json;
//!
//! let query = Query::compile("Reservations[].Instances[].{id: InstanceId, value: `1`}[]")?;
//! let page = json!({
//!     "Reservations": [
//!         {"Instances": [{"InstanceId": "i-1"}, {"InstanceId": "i-2"}]},
//!         {"Instances": [{"InstanceId": "i-3"}]}
//!     ]
//! });
//! let records = query.extract(&page)?;
//! assert_eq!(records.len(), 3);
//! assert_eq!(records[2], json!({"id": "i-3", "value": 1}));
//! # Ok::<(), huginn::query::QueryError>(())
//! ```

mod eval;
mod functions;
mod lexer;
mod parser;

use std::fmt;

use serde_json::Value;

use parser::Ast;

/// A syntax or evaluation error in a search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    position: Option<usize>,
    message: String,
}

impl QueryError {
    pub(crate) fn at(position: usize, message: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            message: message.into(),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Self {
            position: None,
            message: message.into(),
        }
    }

    /// Byte offset of the offending token, for syntax errors.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} at position {position}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for QueryError {}

/// A compiled search expression.
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    ast: Ast,
}

impl Query {
    /// Compile an expression. Surrounding whitespace is ignored.
    pub fn compile(expression: &str) -> Result<Self, QueryError> {
        let source = expression.trim().to_string();
        let ast = parser::parse(&source)?;
        Ok(Self { source, ast })
    }

    /// The (trimmed) source text.
    pub fn expression(&self) -> &str {
        &self.source
    }

    /// Evaluate against `data`, returning the raw result.
    pub fn search(&self, data: &Value) -> Result<Value, QueryError> {
        eval::evaluate(&self.ast, data)
    }

    /// Evaluate against one response page and return the matched items.
    ///
    /// `null` yields no items, an array yields its elements and any other
    /// value yields itself as the single item.
    pub fn extract(&self, page: &Value) -> Result<Vec<Value>, QueryError> {
        Ok(match self.search(page)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => vec![other],
        })
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile `expression` and extract the matched items from `page`.
pub fn extract(expression: &str, page: &Value) -> Result<Vec<Value>, QueryError> {
    Query::compile(expression)?.extract(page)
}
