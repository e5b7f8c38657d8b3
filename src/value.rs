//! Value adaptation between decoded fixture values and concrete Rust types
//!
//! Fixtures are decoded into an untyped `serde_json::Value` tree. At the
//! registry boundary these traits convert that tree into the argument types a
//! registered function expects, and convert the function's results back.
//!
//! A null or absent value maps to the zero value of the target type, so a
//! fixture can omit an argument that the host function treats as "use the
//! default".

use serde_json::Value;
use std::collections::BTreeMap;

/// Conversion from a decoded fixture value into a concrete argument type.
///
/// The error is a bare message; the registry attributes it to a function name
/// and argument index when it surfaces as a binding error.
pub trait FromValue: Sized {
    /// Adapt `value` into `Self`, or describe why it cannot be.
    fn from_value(value: &Value) -> std::result::Result<Self, String>;
}

/// Conversion from a function's return value back into the untyped tree.
pub trait IntoValue {
    /// Convert `self` into a decoded-value representation.
    fn into_value(self) -> Value;
}

/// Short noun for a value's variant, used in binding error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            other => Err(format!("expected boolean, got {}", kind(other))),
        }
    }
}

macro_rules! from_value_int {
    ($($ty:ty => $get:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> std::result::Result<Self, String> {
                    match value {
                        Value::Null => Ok(0),
                        Value::Number(n) => n
                            .$get()
                            .and_then(|v| <$ty>::try_from(v).ok())
                            .ok_or_else(|| format!("number {} out of range for {}", n, stringify!($ty))),
                        other => Err(format!("expected number, got {}", kind(other))),
                    }
                }
            }
        )*
    };
}

from_value_int!(i64 => as_i64, i32 => as_i64, u64 => as_u64, u32 => as_u64, usize => as_u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(0.0),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| format!("number {} is not representable as f64", n)),
            other => Err(format!("expected number, got {}", kind(other))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            other => Err(format!("expected string, got {}", kind(other))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Err(format!("expected sequence, got {}", kind(other))),
        }
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            other => Err(format!("expected mapping, got {}", kind(other))),
        }
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Null
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! into_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::Number(serde_json::Number::from(self as i64))
                }
            }
        )*
    };
}

into_value_int!(i64, i32, u32);

impl IntoValue for u64 {
    fn into_value(self) -> Value {
        Value::Number(serde_json::Number::from(self))
    }
}

impl IntoValue for usize {
    fn into_value(self) -> Value {
        Value::Number(serde_json::Number::from(self as u64))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        // NaN and infinities have no JSON representation
        serde_json::Number::from_f64(self).map_or(Value::Null, Value::Number)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            None => Value::Null,
            Some(v) => v.into_value(),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Object(
            self.into_iter()
                .map(|(k, v)| (k, v.into_value()))
                .collect(),
        )
    }
}
