//! Row to entity mapping.
//!
//! A [`RowBinding`] is resolved once per cursor: every declared field is paired
//! with the result column named `dialect.to_database_name(field)`. Columns no
//! field asks for are ignored, fields without a column are an error.

use std::fmt;
use std::sync::{Arc, OnceLock};
use chrono::{DateTime, Utc};
use crate::core::{Column, DataType, DbError, EntityShape, FromValue, Result, Row, Value, read_value};
use crate::dialect::Dialect;

/// A type with a statically known entity shape.
///
/// Implemented by `#[derive(Entity)]` and for the scalar types read from the
/// first result column.
pub trait Entity: FromRow {
    fn shape() -> &'static EntityShape;
}

/// Builds a value from one mapped row.
pub trait FromRow: Sized {
    fn from_row(row: MappedRow) -> Result<Self>;
}

/// Field to column pairing for one shape against one result set.
#[derive(Debug, Clone)]
pub struct RowBinding {
    shape_name: Arc<str>,
    fields: Arc<[Column]>,
    indices: Vec<usize>,
}

impl RowBinding {
    pub fn new(shape: &EntityShape, dialect: &dyn Dialect, labels: &[String]) -> Result<Self> {
        if shape.is_scalar() {
            if labels.is_empty() {
                return Err(DbError::MappingError(format!(
                    "result has no column to read a {} from",
                    shape.name
                )));
            }
            return Ok(Self {
                shape_name: shape.name.as_str().into(),
                fields: shape.columns().into(),
                indices: vec![0],
            });
        }

        let indices = shape
            .columns()
            .iter()
            .map(|field| {
                let column = dialect.to_database_name(&field.name);
                labels
                    .iter()
                    .position(|label| label.eq_ignore_ascii_case(&column))
                    .ok_or_else(|| {
                        DbError::MappingError(format!(
                            "field '{}' of {} has no matching column '{}' (result has: {})",
                            field.name,
                            shape.name,
                            column,
                            labels.join(", ")
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            shape_name: shape.name.as_str().into(),
            fields: shape.columns().into(),
            indices,
        })
    }

    pub fn shape_name(&self) -> &str {
        &self.shape_name
    }

    pub fn fields(&self) -> &[Column] {
        &self.fields
    }

    /// Result column index per field, in field order.
    pub fn column_indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn map(&self, row: Row) -> Result<MappedRow> {
        let values = self
            .indices
            .iter()
            .map(|&idx| {
                row.get(idx).cloned().ok_or_else(|| {
                    DbError::MappingError(format!(
                        "row of {} has {} value(s), column {} is missing",
                        self.shape_name,
                        row.len(),
                        idx
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MappedRow {
            shape_name: Arc::clone(&self.shape_name),
            fields: Arc::clone(&self.fields),
            values,
        })
    }
}

/// Values of one row, in the field order of the shape.
#[derive(Debug, Clone)]
pub struct MappedRow {
    shape_name: Arc<str>,
    fields: Arc<[Column]>,
    values: Vec<Value>,
}

impl MappedRow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> &[Column] {
        &self.fields
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Moves the value of field `index` out, converted to the field's Rust type.
    pub fn take<T: FromValue>(&mut self, index: usize) -> Result<T> {
        let field = self
            .fields
            .get(index)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| index.to_string());
        let value = self
            .values
            .get_mut(index)
            .map(std::mem::take)
            .ok_or_else(|| {
                DbError::MappingError(format!("{} has no field #{}", self.shape_name, index))
            })?;

        read_value(value).map_err(|e| {
            DbError::MappingError(format!("field '{}' of {}: {}", field, self.shape_name, e))
        })
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Entity whose shape is only known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl FromRow for Record {
    fn from_row(row: MappedRow) -> Result<Self> {
        let MappedRow { shape_name, fields, values } = row;
        let fields = fields
            .iter()
            .zip(values)
            .map(|(column, value)| {
                column.validate(&value).map_err(|e| match e {
                    DbError::MappingError(msg) => {
                        DbError::MappingError(format!("{} of {}", msg, shape_name))
                    }
                    other => other,
                })?;
                Ok((column.name.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

macro_rules! scalar_entities {
    ($($ty:ty => $data_type:expr),* $(,)?) => {
        $(
            impl Entity for $ty {
                fn shape() -> &'static EntityShape {
                    static SHAPE: OnceLock<EntityShape> = OnceLock::new();
                    SHAPE.get_or_init(|| EntityShape::scalar($data_type))
                }
            }

            impl FromRow for $ty {
                fn from_row(mut row: MappedRow) -> Result<Self> {
                    row.take(0)
                }
            }
        )*
    };
}

scalar_entities! {
    i16 => DataType::Integer,
    i32 => DataType::Integer,
    i64 => DataType::Integer,
    f64 => DataType::Float,
    String => DataType::Text,
    bool => DataType::Boolean,
    DateTime<Utc> => DataType::Timestamp,
}
