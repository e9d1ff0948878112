// ============================================================================
// procdb Library
// ============================================================================

//! Typed access to stored procedures.
//!
//! Declare the procedures as a trait, map result rows into plain structs and
//! let a [`ProxyFactory`] build the call surface once per trait:
//!
//! ```
//! use procdb::{Entity, ProxyFactory, QueryResult, Session, Value, stored_procedures};
//! use procdb::memory::MemoryDatabase;
//!
//! #[derive(Debug, Entity)]
//! struct Order {
//!     id: i64,
//!     customer_name: String,
//! }
//!
//! #[stored_procedures]
//! trait OrderRepository {
//!     fn get_order(&mut self, id: i32) -> procdb::Result<Option<Order>>;
//! }
//!
//! # fn main() -> procdb::Result<()> {
//! let db = MemoryDatabase::new();
//! db.register_function("get_order", |args| {
//!     Ok(QueryResult::with_columns(["id", "customer_name"])
//!         .row([args[0].clone(), Value::from("Ada")]))
//! });
//!
//! let mut session = Session::new(Box::new(db.connect()), ProxyFactory::global().dialect_handle());
//! let mut orders = ProxyFactory::global().get_proxy::<dyn OrderRepository>(&mut session)?;
//! let order = orders.get_order(7)?.unwrap();
//! assert_eq!(order.customer_name, "Ada");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod naming;
pub mod dialect;
pub mod preprocessor;
pub mod connection;
pub mod memory;
pub mod result;
pub mod session;
pub mod proxy;

// Re-export main types for convenience
pub use core::{
    Column, DataType, DbError, EntityShape, FromValue, Result, Row, ShapeKind, SqlParam, Value,
};
pub use result::QueryResult;
pub use dialect::{Dialect, DialectKind, MySqlDialect, PostgreSqlDialect};
pub use preprocessor::Preprocessor;

// Re-export session API
pub use connection::{
    Connection, ResultSet,
    config::{BackendKind, ConnectionConfig},
};
pub use session::{Cursor, Entity, FromRow, MappedRow, Record, RowBinding, Session, SessionState};

// Re-export proxy API
pub use proxy::{
    CallResult, DynamicProxy, Implementation, InterfaceDecl, ParamDecl, ProcedureDecl,
    ProcedureInterface, ProxyFactory, ReturnShape, generate,
};

// Derive macros
pub use procdb_derive::{Entity, stored_procedures};
