//! # MemBank Core Types
//!
//! Core data structures and domain types for the cache bank.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed universe of values the bank can cache.
///
/// Call arguments and cached results are both expressed in this enum so
/// that one serialization path covers size accounting and persistence.
/// `Map` keys are strings and the entry order is preserved as supplied;
/// canonicalization (sorting, float normalization) happens only during
/// key derivation, never on stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Returns true if the value is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the inner integer, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the inner string slice, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

/// One call's arguments: positional values in call order plus named
/// keyword values in whatever order the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl CallArgs {
    /// Create an empty argument list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from positional values only
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            args: values.into_iter().map(Into::into).collect(),
            kwargs: Vec::new(),
        }
    }

    /// Append one positional argument (builder style)
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append one keyword argument (builder style)
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }

    /// Returns true when there are no arguments at all
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Opaque handle identifying one registered function in the bank.
///
/// Produced by the registration step at wrap time. The identity is the
/// qualified name supplied by the caller; two wrappers registered under
/// the same name deliberately share one function cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(String);

impl FuncId {
    /// Intern a qualified function name into an identity handle
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The registered name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FuncId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from("hi"), Value::Str("hi".into()));
        assert_eq!(
            Value::from(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(Value::Null.is_null());
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Str("x".into()).as_str(), Some("x"));
    }

    #[test]
    fn test_call_args_builder() {
        let call = CallArgs::new().arg(1i64).arg("a").kwarg("k", true);
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.kwargs.len(), 1);
        assert!(!call.is_empty());
        assert!(CallArgs::new().is_empty());
    }

    #[test]
    fn test_func_id_identity() {
        let a = FuncId::new("fib");
        let b = FuncId::from("fib");
        assert_eq!(a, b);
        assert_eq!(a.name(), "fib");
        assert_eq!(a.to_string(), "fib");
    }
}
