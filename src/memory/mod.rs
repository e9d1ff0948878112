//! In-process backend implementing stored functions as Rust closures.
//!
//! Statements are logged with their bound parameters so callers can assert on
//! the exact SQL a proxy produced.

mod connection;
mod database;
mod statement;

pub use connection::{MemoryConnection, MemoryResultSet};
pub use database::{MemoryDatabase, MemoryStats, StatementRecord, StoredFunction};
pub use statement::{Argument, MemoryStatement};
