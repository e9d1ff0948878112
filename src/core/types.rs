use serde::{Deserialize, Serialize};
use super::{DbError, Result, DataType, Value};

pub type Row = Vec<Value>;

/// One declared field of an entity shape, named in code convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if !self.nullable {
                return Err(DbError::MappingError(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::MappingError(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Named fields matched to result columns by name.
    #[default]
    Record,
    /// A single value read from the first result column.
    Scalar { data_type: DataType },
}

/// The per-shape descriptor rows are mapped through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityShape {
    pub name: String,
    #[serde(default)]
    pub kind: ShapeKind,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl EntityShape {
    pub fn record(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            kind: ShapeKind::Record,
            columns,
        }
    }

    pub fn scalar(data_type: DataType) -> Self {
        Self {
            name: data_type.to_string(),
            kind: ShapeKind::Scalar { data_type },
            columns: vec![Column::new("value", data_type).nullable(true)],
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, ShapeKind::Scalar { .. })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_validate() {
        let column = Column::new("customerName", DataType::Text);
        assert!(column.validate(&Value::Text("Ann".into())).is_ok());
        assert!(matches!(column.validate(&Value::Null), Err(DbError::MappingError(_))));
        assert!(column.clone().nullable(true).validate(&Value::Null).is_ok());
        assert!(column.validate(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_shape_lookup() {
        let shape = EntityShape::record(
            "Order",
            vec![
                Column::new("id", DataType::Integer),
                Column::new("customerName", DataType::Text),
            ],
        );
        assert_eq!(shape.find_column_index("customerName"), Some(1));
        assert!(shape.get_column("missing").is_none());
        assert!(!shape.is_scalar());
        assert!(EntityShape::scalar(DataType::Integer).is_scalar());
    }

    #[test]
    fn test_shape_deserializes_without_kind() {
        let shape: EntityShape = serde_json::from_str(
            r#"{"name":"Order","columns":[{"name":"id","data_type":"integer"}]}"#,
        )
        .unwrap();
        assert_eq!(shape.kind, ShapeKind::Record);
        assert_eq!(shape.columns[0].data_type, DataType::Integer);
        assert!(!shape.columns[0].nullable);
    }
}
