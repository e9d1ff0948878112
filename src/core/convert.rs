//! Conversions between Rust values and [`Value`].
//!
//! [`SqlParam`] covers the argument side of a call, [`FromValue`] the row side.
//! Both carry the static [`DataType`] so declarations can be checked before
//! any statement runs.

use chrono::{DateTime, NaiveDateTime, Utc};
use crate::core::{DataType, DbError, Result, Value};

/// A Rust type that can be bound as a stored-procedure argument.
pub trait SqlParam {
    const DATA_TYPE: DataType;

    fn into_value(self) -> Value;
}

/// A Rust type that an entity field or scalar result can be read into.
pub trait FromValue: Sized {
    const DATA_TYPE: DataType;
    const NULLABLE: bool = false;

    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: DataType, value: &Value) -> DbError {
    DbError::TypeMismatch(format!(
        "expected {}, got {}",
        expected,
        value.type_name()
    ))
}

macro_rules! integer_conversions {
    ($($ty:ty),*) => {
        $(
            impl SqlParam for $ty {
                const DATA_TYPE: DataType = DataType::Integer;

                fn into_value(self) -> Value {
                    Value::Integer(self as i64)
                }
            }

            impl FromValue for $ty {
                const DATA_TYPE: DataType = DataType::Integer;

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(i).map_err(|_| {
                            DbError::TypeMismatch(format!(
                                "integer {} is out of range for {}",
                                i,
                                stringify!($ty)
                            ))
                        }),
                        other => Err(mismatch(DataType::Integer, &other)),
                    }
                }
            }
        )*
    };
}

integer_conversions!(i16, i32, i64);

impl SqlParam for f32 {
    const DATA_TYPE: DataType = DataType::Float;

    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }
}

impl SqlParam for f64 {
    const DATA_TYPE: DataType = DataType::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FromValue for f64 {
    const DATA_TYPE: DataType = DataType::Float;

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| mismatch(DataType::Float, &value))
    }
}

impl FromValue for f32 {
    const DATA_TYPE: DataType = DataType::Float;

    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl SqlParam for bool {
    const DATA_TYPE: DataType = DataType::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl FromValue for bool {
    const DATA_TYPE: DataType = DataType::Boolean;

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(mismatch(DataType::Boolean, &other)),
        }
    }
}

impl SqlParam for String {
    const DATA_TYPE: DataType = DataType::Text;

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl SqlParam for &str {
    const DATA_TYPE: DataType = DataType::Text;

    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl SqlParam for &String {
    const DATA_TYPE: DataType = DataType::Text;

    fn into_value(self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    const DATA_TYPE: DataType = DataType::Text;

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(DataType::Text, &other)),
        }
    }
}

impl SqlParam for DateTime<Utc> {
    const DATA_TYPE: DataType = DataType::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

impl SqlParam for NaiveDateTime {
    const DATA_TYPE: DataType = DataType::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(self.and_utc())
    }
}

impl FromValue for DateTime<Utc> {
    const DATA_TYPE: DataType = DataType::Timestamp;

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Integer(millis) => DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                DbError::TypeMismatch(format!("epoch millis {} is out of range", millis))
            }),
            other => Err(mismatch(DataType::Timestamp, &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    const DATA_TYPE: DataType = DataType::Timestamp;

    fn from_value(value: Value) -> Result<Self> {
        DateTime::<Utc>::from_value(value).map(|ts| ts.naive_utc())
    }
}

impl SqlParam for Vec<i32> {
    const DATA_TYPE: DataType = DataType::IntegerArray;

    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(Value::from).collect())
    }
}

impl SqlParam for &[i32] {
    const DATA_TYPE: DataType = DataType::IntegerArray;

    fn into_value(self) -> Value {
        Value::Array(self.iter().copied().map(Value::from).collect())
    }
}

impl<T: SqlParam> SqlParam for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;

    fn into_value(self) -> Value {
        match self {
            Some(inner) => inner.into_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
    const NULLABLE: bool = true;

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Reads a non-null value, failing on `Null` for non-optional targets.
pub fn read_value<T: FromValue>(value: Value) -> Result<T> {
    if value.is_null() && !T::NULLABLE {
        return Err(DbError::TypeMismatch(format!(
            "NULL cannot be read into a non-optional {}",
            T::DATA_TYPE
        )));
    }
    T::from_value(value)
}
