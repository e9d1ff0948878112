pub mod convert;
pub mod error;
pub mod types;
pub mod value;

pub use convert::{FromValue, SqlParam, read_value};
pub use error::{DbError, Result};
pub use types::{Column, EntityShape, Row, ShapeKind};
pub use value::{DataType, Value};
