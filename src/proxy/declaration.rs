use serde::{Deserialize, Serialize};
use crate::core::{DataType, EntityShape};
use crate::preprocessor::Preprocessor;

/// A set of stored procedures implemented together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    #[serde(default)]
    pub procedures: Vec<ProcedureDecl>,
}

impl InterfaceDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedures: Vec::new(),
        }
    }

    pub fn procedure(mut self, procedure: ProcedureDecl) -> Self {
        self.procedures.push(procedure);
        self
    }

    pub fn find(&self, name: &str) -> Option<&ProcedureDecl> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

/// One stored-procedure call, named in code convention (`getOrder`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub returns: ReturnShape,
}

impl ProcedureDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnShape::Void,
        }
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnShape) -> Self {
        self.returns = returns;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// At most one tag is accepted by the generator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessors: Vec<Preprocessor>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            preprocessors: Vec::new(),
        }
    }

    pub fn preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessors.push(preprocessor);
        self
    }
}

/// What a call hands back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum ReturnShape {
    #[default]
    Void,
    /// Zero or one entity.
    Single(EntityShape),
    List(EntityShape),
    /// Lazy, forward-only sequence.
    Cursor(EntityShape),
}

impl ReturnShape {
    pub fn entity(&self) -> Option<&EntityShape> {
        match self {
            Self::Void => None,
            Self::Single(shape) | Self::List(shape) | Self::Cursor(shape) => Some(shape),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Single(_) => "single",
            Self::List(_) => "list",
            Self::Cursor(_) => "cursor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    #[test]
    fn test_builder() {
        let decl = InterfaceDecl::new("OrderRepository").procedure(
            ProcedureDecl::new("findOrders")
                .param(ParamDecl::new("customer", DataType::Text).preprocessor(Preprocessor::LikePrefix))
                .returns(ReturnShape::List(EntityShape::record(
                    "Order",
                    vec![Column::new("id", DataType::Integer)],
                ))),
        );

        let find = decl.find("findOrders").unwrap();
        assert_eq!(find.params.len(), 1);
        assert_eq!(find.returns.kind(), "list");
        assert_eq!(find.returns.entity().unwrap().name, "Order");
        assert!(decl.find("missing").is_none());
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{
            "name": "OrderRepository",
            "procedures": [
                {
                    "name": "getOrder",
                    "params": [{"name": "id", "type": "INTEGER"}],
                    "returns": {
                        "kind": "single",
                        "entity": {
                            "name": "Order",
                            "columns": [
                                {"name": "id", "data_type": "INTEGER"},
                                {"name": "customerName", "data_type": "TEXT"}
                            ]
                        }
                    }
                },
                {"name": "archiveOrders",
                 "params": [{"name": "flags", "type": "INTEGER[]", "preprocessors": ["bit_mask"]}]}
            ]
        }"#;

        let decl: InterfaceDecl = serde_json::from_str(json).unwrap();
        assert_eq!(decl.procedures.len(), 2);
        assert_eq!(decl.procedures[0].params[0].data_type, DataType::Integer);
        assert!(matches!(decl.procedures[0].returns, ReturnShape::Single(_)));
        assert_eq!(decl.procedures[1].returns, ReturnShape::Void);
        assert_eq!(decl.procedures[1].params[0].preprocessors, vec![Preprocessor::BitMask]);
    }
}
