//! The engine's scalar value type.
//!
//! [`FieldValue`] covers the types the columnar storage layer can encode:
//! integers, floats, text, booleans and NULL. Arithmetic and comparison
//! operators propagate NULL (any NULL operand yields NULL); `IS` / `IS NOT`
//! are the only NULL-safe comparisons.

use crate::error::{DbError, DbResult};
use serde::ser::{Serialize, Serializer};
use std::cmp::Ordering;

/// A single value in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    Text(String),
    /// Boolean value
    Boolean(bool),
    /// SQL NULL
    Null,
}

impl FieldValue {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "INTEGER",
            FieldValue::Float(_) => "FLOAT",
            FieldValue::Text(_) => "TEXT",
            FieldValue::Boolean(_) => "BOOLEAN",
            FieldValue::Null => "NULL",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }

    /// SQL truthiness: NULL, false, zero and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Boolean(b) => *b,
            FieldValue::Integer(i) => *i != 0,
            FieldValue::Float(f) => *f != 0.0,
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::Null => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn add(&self, other: &FieldValue) -> DbResult<FieldValue> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a
                .checked_add(*b)
                .map(FieldValue::Integer)
                .ok_or_else(|| DbError::execution("Integer overflow")),
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                Ok(FieldValue::Text(format!("{}{}", a, b)))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(FieldValue::Float(a + b)),
                _ => Err(DbError::type_error(
                    "numeric",
                    format!("{} + {}", self.type_name(), other.type_name()),
                )),
            },
        }
    }

    pub fn subtract(&self, other: &FieldValue) -> DbResult<FieldValue> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a
                .checked_sub(*b)
                .map(FieldValue::Integer)
                .ok_or_else(|| DbError::execution("Integer overflow")),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(FieldValue::Float(a - b)),
                _ => Err(DbError::type_error(
                    "numeric",
                    format!("{} - {}", self.type_name(), other.type_name()),
                )),
            },
        }
    }

    pub fn multiply(&self, other: &FieldValue) -> DbResult<FieldValue> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a
                .checked_mul(*b)
                .map(FieldValue::Integer)
                .ok_or_else(|| DbError::execution("Integer overflow")),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(FieldValue::Float(a * b)),
                _ => Err(DbError::type_error(
                    "numeric",
                    format!("{} * {}", self.type_name(), other.type_name()),
                )),
            },
        }
    }

    /// Division always produces a float; dividing by zero is a runtime error.
    pub fn divide(&self, other: &FieldValue) -> DbResult<FieldValue> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => {
                    Err(DbError::execution("Division by zero"))
                }
                (Some(a), Some(b)) => Ok(FieldValue::Float(a / b)),
                _ => Err(DbError::type_error(
                    "numeric",
                    format!("{} / {}", self.type_name(), other.type_name()),
                )),
            },
        }
    }

    /// Equality comparison with NULL propagation.
    pub fn equals(&self, other: &FieldValue) -> DbResult<FieldValue> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            _ => Ok(FieldValue::Boolean(self.loose_eq(other))),
        }
    }

    /// Ordering comparison with NULL propagation: `None` means at least one
    /// operand was NULL and the comparison result is NULL too.
    pub fn compare(&self, other: &FieldValue) -> DbResult<Option<Ordering>> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(None),
            (FieldValue::Text(a), FieldValue::Text(b)) => Ok(Some(a.cmp(b))),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Ok(Some(a.cmp(b))),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(Some(a.total_cmp(&b))),
                _ => Err(DbError::type_error(
                    self.type_name(),
                    other.type_name(),
                )),
            },
        }
    }

    /// Value equality across the integer/float divide, no NULL propagation.
    /// Used by `IS` / `IS NOT` and by hash-join bucket probing.
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Null, _) | (_, FieldValue::Null) => false,
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Total ordering used by the sort operator: NULLs first, then booleans,
    /// numbers and text, with a type rank keeping mixed columns stable.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        fn rank(value: &FieldValue) -> u8 {
            match value {
                FieldValue::Null => 0,
                FieldValue::Boolean(_) => 1,
                FieldValue::Integer(_) | FieldValue::Float(_) => 2,
                FieldValue::Text(_) => 3,
            }
        }

        match (self, other) {
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }

    /// Cast to a named type, following widening and string-parsing rules.
    pub fn cast_to(self, target_type: &str) -> DbResult<FieldValue> {
        match target_type.to_uppercase().as_str() {
            "INT" | "INTEGER" => match self {
                FieldValue::Integer(i) => Ok(FieldValue::Integer(i)),
                FieldValue::Float(f) => Ok(FieldValue::Integer(f as i64)),
                FieldValue::Boolean(b) => Ok(FieldValue::Integer(if b { 1 } else { 0 })),
                FieldValue::Text(s) => s.trim().parse::<i64>().map(FieldValue::Integer).map_err(
                    |_| DbError::execution(format!("Cannot cast '{}' to INTEGER", s)),
                ),
                FieldValue::Null => Ok(FieldValue::Null),
            },
            "FLOAT" | "DOUBLE" => match self {
                FieldValue::Integer(i) => Ok(FieldValue::Float(i as f64)),
                FieldValue::Float(f) => Ok(FieldValue::Float(f)),
                FieldValue::Boolean(b) => Ok(FieldValue::Float(if b { 1.0 } else { 0.0 })),
                FieldValue::Text(s) => s.trim().parse::<f64>().map(FieldValue::Float).map_err(
                    |_| DbError::execution(format!("Cannot cast '{}' to FLOAT", s)),
                ),
                FieldValue::Null => Ok(FieldValue::Null),
            },
            "STRING" | "TEXT" | "VARCHAR" => match self {
                FieldValue::Null => Ok(FieldValue::Null),
                other => Ok(FieldValue::Text(other.to_display_string())),
            },
            "BOOL" | "BOOLEAN" => match self {
                FieldValue::Boolean(b) => Ok(FieldValue::Boolean(b)),
                FieldValue::Integer(i) => Ok(FieldValue::Boolean(i != 0)),
                FieldValue::Text(s) => match s.to_uppercase().as_str() {
                    "TRUE" | "T" | "1" => Ok(FieldValue::Boolean(true)),
                    "FALSE" | "F" | "0" => Ok(FieldValue::Boolean(false)),
                    _ => Err(DbError::execution(format!(
                        "Cannot cast '{}' to BOOLEAN",
                        s
                    ))),
                },
                FieldValue::Null => Ok(FieldValue::Null),
                other => Err(DbError::execution(format!(
                    "Cannot cast {} to BOOLEAN",
                    other.type_name()
                ))),
            },
            other => Err(DbError::execution(format!(
                "Unknown cast target type: {}",
                other
            ))),
        }
    }

    /// Human-readable rendering, used for display output and status lines.
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Null => "NULL".to_string(),
        }
    }
}

/// Build a hashable key from a tuple of values. Used wherever values are
/// grouped or deduplicated: GROUP BY keys, DISTINCT, hash-join buckets.
/// Integers and floats that compare equal produce the same key.
pub fn group_key(values: &[FieldValue]) -> String {
    let mut key = String::new();
    for value in values {
        match value {
            FieldValue::Null => key.push_str("n:"),
            FieldValue::Boolean(b) => key.push_str(&format!("b:{}", b)),
            FieldValue::Integer(i) => key.push_str(&format!("f:{}", *i as f64)),
            FieldValue::Float(f) => key.push_str(&format!("f:{}", f)),
            FieldValue::Text(s) => key.push_str(&format!("t:{}", s)),
        }
        key.push('\x1f');
    }
    key
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> serde::Deserialize<'de> for FieldValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a scalar field value or null")
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<FieldValue, E> {
                Ok(FieldValue::Integer(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<FieldValue, E> {
                i64::try_from(v)
                    .map(FieldValue::Integer)
                    .map_err(|_| E::custom("integer out of range"))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<FieldValue, E> {
                Ok(FieldValue::Float(v))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<FieldValue, E> {
                Ok(FieldValue::Boolean(v))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v.to_string()))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_propagation() {
        let result = FieldValue::Integer(1).add(&FieldValue::Null).unwrap();
        assert!(result.is_null());

        let result = FieldValue::Null.multiply(&FieldValue::Float(2.0)).unwrap();
        assert!(result.is_null());

        let result = FieldValue::Integer(1).equals(&FieldValue::Null).unwrap();
        assert!(result.is_null());
    }

    #[test]
    fn test_integer_division_yields_float() {
        let result = FieldValue::Integer(3).divide(&FieldValue::Integer(2)).unwrap();
        assert_eq!(result, FieldValue::Float(1.5));
    }

    #[test]
    fn test_division_by_zero() {
        let err = FieldValue::Integer(1)
            .divide(&FieldValue::Integer(0))
            .unwrap_err();
        assert_eq!(err, DbError::execution("Division by zero"));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let err = FieldValue::Integer(i64::MAX)
            .add(&FieldValue::Integer(1))
            .unwrap_err();
        assert_eq!(err, DbError::execution("Integer overflow"));

        let err = FieldValue::Integer(i64::MIN)
            .subtract(&FieldValue::Integer(1))
            .unwrap_err();
        assert_eq!(err, DbError::execution("Integer overflow"));

        let err = FieldValue::Integer(i64::MAX)
            .multiply(&FieldValue::Integer(2))
            .unwrap_err();
        assert_eq!(err, DbError::execution("Integer overflow"));
    }

    #[test]
    fn test_mixed_numeric_promotion() {
        let result = FieldValue::Integer(1).add(&FieldValue::Float(0.5)).unwrap();
        assert_eq!(result, FieldValue::Float(1.5));
    }

    #[test]
    fn test_non_numeric_arithmetic_errors() {
        let err = FieldValue::Boolean(true)
            .add(&FieldValue::Integer(1))
            .unwrap_err();
        assert!(matches!(err, DbError::TypeError { .. }));
    }

    #[test]
    fn test_truthiness() {
        assert!(FieldValue::Integer(5).is_truthy());
        assert!(!FieldValue::Integer(0).is_truthy());
        assert!(!FieldValue::Text(String::new()).is_truthy());
        assert!(!FieldValue::Null.is_truthy());
    }

    #[test]
    fn test_cast_string_to_int() {
        let result = FieldValue::Text("42".to_string()).cast_to("INT").unwrap();
        assert_eq!(result, FieldValue::Integer(42));

        let err = FieldValue::Text("abc".to_string()).cast_to("INT").unwrap_err();
        assert!(matches!(err, DbError::ExecutionError { .. }));
    }

    #[test]
    fn test_group_key_unifies_int_and_float() {
        let a = group_key(&[FieldValue::Integer(1)]);
        let b = group_key(&[FieldValue::Float(1.0)]);
        assert_eq!(a, b);

        // but not text that looks the same
        let c = group_key(&[FieldValue::Text("1".to_string())]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        assert_eq!(
            FieldValue::Null.sort_cmp(&FieldValue::Integer(0)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Integer(2).sort_cmp(&FieldValue::Float(1.5)),
            Ordering::Greater
        );
    }
}
