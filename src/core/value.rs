use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::{DbError, Result};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::Array(_) => "ARRAY",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The declared type this value is an instance of, `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Timestamp(_) => Some(DataType::Timestamp),
            Self::Array(_) => Some(DataType::IntegerArray),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => {
                if fl.is_nan() {
                    write!(f, "NaN")
                } else if fl.is_infinite() {
                    if *fl > 0.0 {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else {
                    write!(f, "{}", fl)
                }
            }
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Static type of a procedure parameter or an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    IntegerArray,
}

impl DataType {
    /// Accepts the common SQL and Rust spellings of each type.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        let data_type = match normalized.as_str() {
            "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "i16"
            | "i32" | "i64" => Self::Integer,
            "float" | "real" | "double" | "double precision" | "float4" | "float8"
            | "numeric" | "f32" | "f64" => Self::Float,
            "text" | "varchar" | "string" | "char" | "str" => Self::Text,
            "boolean" | "bool" => Self::Boolean,
            "timestamp" | "timestamptz" | "datetime" => Self::Timestamp,
            "integer[]" | "int[]" | "integer_array" | "vec<i32>" => Self::IntegerArray,
            _ => {
                return Err(DbError::TypeMismatch(format!(
                    "Unsupported type '{}'",
                    name
                )));
            }
        };
        Ok(data_type)
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::IntegerArray, Value::Array(items)) => {
                items.iter().all(|item| matches!(item, Value::Integer(_) | Value::Null))
            }
            _ => false,
        }
    }

    /// Whether a single result column can carry this type.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::IntegerArray)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::IntegerArray => write!(f, "INTEGER[]"),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Float(3.5), Value::Float(3.5));
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        assert_ne!(Value::Text("1".into()), Value::Integer(1));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
        assert!(DataType::IntegerArray.is_compatible(&Value::Array(vec![Value::Integer(1)])));
    }

    #[test]
    fn test_parse_data_type() {
        assert_eq!(DataType::parse("BIGINT").unwrap(), DataType::Integer);
        assert_eq!(DataType::parse("varchar").unwrap(), DataType::Text);
        assert_eq!(DataType::parse("integer[]").unwrap(), DataType::IntegerArray);
        assert!(matches!(DataType::parse("uuid"), Err(DbError::TypeMismatch(_))));
    }

    #[test]
    fn test_data_type_display_round_trips_through_parse() {
        for data_type in [
            DataType::Integer,
            DataType::Float,
            DataType::Text,
            DataType::Boolean,
            DataType::Timestamp,
            DataType::IntegerArray,
        ] {
            assert_eq!(DataType::parse(&data_type.to_string()).unwrap(), data_type);
        }
    }
}
