pub mod config;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::core::{DbError, Result, Row, Value};
use config::{BackendKind, ConnectionConfig};

/// Database connection handle consumed by [`Session`](crate::Session).
///
/// Statements carry positional `?` placeholders; `params` bind to them in order.
/// Failures of the transport itself must be reported as
/// [`DbError::ConnectivityError`]; statement-level rejections as
/// [`DbError::ExecutionError`].
pub trait Connection: Send {
    /// Execute a statement, discarding any rows. Returns the affected row count when known.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query and return a forward-only result set.
    ///
    /// `fetch_size` bounds how many rows travel per round trip; backends must
    /// not pull the whole result up front.
    fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[Value],
        fetch_size: usize,
    ) -> Result<Box<dyn ResultSet + 'a>>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn auto_commit(&self) -> bool;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Forward-only rows produced by [`Connection::query`].
pub trait ResultSet {
    /// Column labels in result order.
    fn columns(&self) -> &[String];

    /// Fetch up to `max_rows` further rows. A batch may come back short; only
    /// an empty batch means the set is exhausted.
    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>>;
}

/// Open a connection for the backend selected by the configuration URL.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    config.validate().map_err(DbError::ConfigError)?;

    let mut connection: Box<dyn Connection> = match config.backend()? {
        BackendKind::Memory(name) => {
            Box::new(crate::memory::MemoryDatabase::named(&name).connect())
        }
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => Box::new(postgres::PgConnection::connect(config)?),
        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres => {
            return Err(DbError::ConfigError(
                "PostgreSQL URLs require the `postgres` feature".into(),
            ));
        }
    };

    connection.set_auto_commit(config.auto_commit)?;
    Ok(connection)
}
