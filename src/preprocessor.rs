//! Transforms applied to call arguments before they are bound.
//!
//! Every transform is total on its declared input type and maps `Null` to `Null`.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::{DataType, Value};

/// Tag attached to a procedure parameter selecting its pre-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessor {
    LowerCase,
    UpperCase,
    LikePrefix,
    Timestamp,
    BitMask,
}

impl Preprocessor {
    /// The parameter type this transform is declared on.
    pub fn input_type(&self) -> DataType {
        match self {
            Self::LowerCase | Self::UpperCase | Self::LikePrefix => DataType::Text,
            Self::Timestamp => DataType::Integer,
            Self::BitMask => DataType::IntegerArray,
        }
    }

    /// The type of the value actually bound.
    pub fn output_type(&self) -> DataType {
        match self {
            Self::LowerCase | Self::UpperCase | Self::LikePrefix => DataType::Text,
            Self::Timestamp => DataType::Timestamp,
            Self::BitMask => DataType::Integer,
        }
    }

    pub fn accepts(&self, data_type: DataType) -> bool {
        self.input_type() == data_type
    }

    /// Applies the transform. Values outside the declared input type pass through unchanged.
    pub fn apply(&self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::LowerCase, Value::Text(s)) => Value::Text(s.to_lowercase()),
            (Self::UpperCase, Value::Text(s)) => Value::Text(s.to_uppercase()),
            (Self::LikePrefix, Value::Text(s)) => Value::Text(like_prefix_str(&s)),
            (Self::Timestamp, Value::Integer(millis)) => {
                timestamp(Some(millis)).map(Value::Timestamp).unwrap_or(Value::Null)
            }
            (Self::BitMask, Value::Array(items)) => {
                let flags: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
                bit_mask_i64(&flags).map(|mask| Value::Integer(mask as i64)).unwrap_or(Value::Null)
            }
            (_, other) => other,
        }
    }
}

impl fmt::Display for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LowerCase => "lower_case",
            Self::UpperCase => "upper_case",
            Self::LikePrefix => "like_prefix",
            Self::Timestamp => "timestamp",
            Self::BitMask => "bit_mask",
        };
        write!(f, "{}", name)
    }
}

pub fn lower_case(s: Option<&str>) -> Option<String> {
    s.map(str::to_lowercase)
}

pub fn upper_case(s: Option<&str>) -> Option<String> {
    s.map(str::to_uppercase)
}

fn like_prefix_str(s: &str) -> String {
    let mut out = s.to_lowercase().replace('_', "\\_").replace('%', "\\%");
    out.push('%');
    out
}

/// Builds a prefix pattern for `LIKE`: lower-cases, escapes `_` and `%`, appends `%`.
pub fn like_prefix(s: Option<&str>) -> Option<String> {
    s.map(like_prefix_str)
}

/// Epoch milliseconds to a timestamp. Values outside the representable range map to `None`.
pub fn timestamp(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

fn bit_mask_i64(flags: &[i64]) -> Option<i32> {
    if flags.is_empty() {
        return None;
    }
    // Shift counts wrap modulo 32, so 32 sets bit 0 again.
    Some(flags.iter().fold(0i32, |mask, &flag| mask | 1i32.wrapping_shl(flag as u32)))
}

/// ORs `1 << i` for every flag in `0..=31`.
///
/// `None` and an empty list both yield `None` ("no filter"), which stays
/// distinct from a mask that happens to be zero.
pub fn bit_mask(flags: Option<&[i32]>) -> Option<i32> {
    let flags: Vec<i64> = flags?.iter().map(|&flag| flag as i64).collect();
    bit_mask_i64(&flags)
}
