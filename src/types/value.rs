//! Constant values appearing in predicate expressions
//!
//! The planner never evaluates rows; it only needs constants for search keys,
//! LIKE-prefix rewriting and partition-value inference.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A constant value in a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    pub fn integer(i: i64) -> Self {
        Value::Integer(i)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "'{}'", s),
        }
    }
}
