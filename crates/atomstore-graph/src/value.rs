//! Values attached to atoms under keys

use crate::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed, immutable datum
///
/// Values are replaced wholesale when written. Additive changes go through
/// [`Value::merge_delta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(Vec<f64>),
    String(Vec<String>),
    List(Vec<Value>),
    Atom(Handle),
}

impl Value {
    pub fn floats(values: impl Into<Vec<f64>>) -> Self {
        Value::Float(values.into())
    }

    pub fn strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Value::String(values.into_iter().map(Into::into).collect())
    }

    pub fn as_atom(&self) -> Option<&Handle> {
        match self {
            Value::Atom(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Apply a delta to this value
    ///
    /// Float vectors are added element-wise, with the shorter vector padded
    /// by zeros. Every other combination is replaced by the delta.
    pub fn merge_delta(&self, delta: &Value) -> Value {
        match (self, delta) {
            (Value::Float(base), Value::Float(inc)) => {
                let len = base.len().max(inc.len());
                let sum = (0..len)
                    .map(|i| base.get(i).copied().unwrap_or(0.0) + inc.get(i).copied().unwrap_or(0.0))
                    .collect();
                Value::Float(sum)
            }
            _ => delta.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => {
                write!(f, "(FloatValue")?;
                for x in v {
                    write!(f, " {}", x)?;
                }
                write!(f, ")")
            }
            Value::String(v) => {
                write!(f, "(StringValue")?;
                for s in v {
                    write!(f, " {:?}", s)?;
                }
                write!(f, ")")
            }
            Value::List(v) => {
                write!(f, "(LinkValue")?;
                for item in v {
                    write!(f, " {}", item)?;
                }
                write!(f, ")")
            }
            Value::Atom(h) => write!(f, "{}", h),
        }
    }
}
