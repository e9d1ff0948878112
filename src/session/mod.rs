pub mod cursor;
pub mod mapper;

pub use cursor::Cursor;
pub use mapper::{Entity, FromRow, MappedRow, Record, RowBinding};

use std::sync::Arc;
use tracing::{Level, event};
use uuid::Uuid;
use crate::connection::config::{ConnectionConfig, DEFAULT_FETCH_SIZE};
use crate::connection::{self, Connection};
use crate::core::{DbError, EntityShape, Result, Value};
use crate::dialect::Dialect;

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// A connectivity failure happened; the session must be discarded.
    Broken,
    Closed,
}

/// One unit of work over one connection
///
/// Not shareable across threads: every statement and every open [`Cursor`]
/// borrows the session mutably, so the borrow checker serializes access and a
/// cursor cannot outlive the session that produced it.
pub struct Session {
    /// Unique session ID, reported in log events
    id: Uuid,
    connection: Box<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    state: SessionState,
    fetch_size: usize,
}

/// Marks the session broken when `result` carries a connectivity failure.
fn track<T>(state: &mut SessionState, id: Uuid, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        if err.is_connectivity() && *state == SessionState::Active {
            *state = SessionState::Broken;
            event!(Level::WARN, session = %id, error = %err, "session broken");
        }
    }
    result
}

impl Session {
    pub fn new(connection: Box<dyn Connection>, dialect: Arc<dyn Dialect>) -> Self {
        let id = Uuid::new_v4();
        event!(Level::DEBUG, session = %id, dialect = dialect.name(), "session opened");
        Self {
            id,
            connection,
            dialect,
            state: SessionState::Active,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Connect to the backend named by `config.url`
    ///
    /// # Examples
    ///
    /// ```
    /// # use procdb::{ConnectionConfig, Session};
    /// let config = ConnectionConfig::new("memory://doc_session").fetch_size(50);
    /// let session = Session::open(&config).unwrap();
    /// assert_eq!(session.default_fetch_size(), 50);
    /// ```
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let connection = connection::connect(config)?;
        let mut session = Self::new(connection, config.dialect.create());
        session.fetch_size = config.fetch_size;
        event!(
            Level::INFO,
            session = %session.id,
            url = %config.to_url(),
            auto_commit = config.auto_commit,
            "session connected"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn dialect_handle(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.dialect)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn default_fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn set_default_fetch_size(&mut self, fetch_size: usize) -> Result<()> {
        if fetch_size == 0 {
            return Err(DbError::InvalidArgument("fetch size must be > 0".into()));
        }
        self.fetch_size = fetch_size;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn is_broken(&self) -> bool {
        self.state == SessionState::Broken
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(DbError::SessionClosed),
            SessionState::Broken => Err(DbError::ConnectivityError(
                "session is unusable after a connectivity failure".into(),
            )),
        }
    }

    /// Execute a statement, discarding any rows
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_active()?;
        event!(Level::DEBUG, session = %self.id, sql, params = params.len(), "execute");
        let result = self.connection.execute(sql, params);
        track(&mut self.state, self.id, result)
    }

    /// Open a cursor with the session's default fetch size
    pub fn get_cursor<T: Entity>(&mut self, sql: &str, params: &[Value]) -> Result<Cursor<'_, T>> {
        let fetch_size = self.fetch_size;
        self.get_cursor_for_shape(sql, T::shape(), fetch_size, params)
    }

    pub fn get_cursor_with_fetch_size<T: Entity>(
        &mut self,
        sql: &str,
        fetch_size: usize,
        params: &[Value],
    ) -> Result<Cursor<'_, T>> {
        self.get_cursor_for_shape(sql, T::shape(), fetch_size, params)
    }

    /// Open a cursor mapping rows through `shape`
    ///
    /// Parameters bind positionally to the `?` placeholders of `sql`.
    pub fn get_cursor_for_shape<T: FromRow>(
        &mut self,
        sql: &str,
        shape: &EntityShape,
        fetch_size: usize,
        params: &[Value],
    ) -> Result<Cursor<'_, T>> {
        if fetch_size == 0 {
            return Err(DbError::InvalidArgument("fetch size must be > 0".into()));
        }
        self.ensure_active()?;
        event!(
            Level::DEBUG,
            session = %self.id,
            sql,
            params = params.len(),
            fetch_size,
            "query"
        );

        let Session { id, connection, dialect, state, .. } = self;
        let rows = track(state, *id, connection.query(sql, params, fetch_size))?;
        let binding = RowBinding::new(shape, dialect.as_ref(), rows.columns())?;
        Ok(Cursor::new(rows, binding, fetch_size)?.attach(state))
    }

    pub fn get_list<T: Entity>(&mut self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        self.get_cursor::<T>(sql, params)?.fetch_list()
    }

    pub fn get_single<T: Entity>(&mut self, sql: &str, params: &[Value]) -> Result<T> {
        self.get_cursor::<T>(sql, params)?.fetch_single()
    }

    pub fn get_single_or_null<T: Entity>(&mut self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        self.get_cursor::<T>(sql, params)?.fetch_single_or_null()
    }

    /// Rows mapped through a shape known only at runtime
    pub fn get_records(
        &mut self,
        sql: &str,
        shape: &EntityShape,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        let fetch_size = self.fetch_size;
        self.get_cursor_for_shape::<Record>(sql, shape, fetch_size, params)?
            .fetch_list()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let result = self.connection.commit();
        track(&mut self.state, self.id, result)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        let result = self.connection.rollback();
        track(&mut self.state, self.id, result)
    }

    pub fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.ensure_active()?;
        let result = self.connection.set_auto_commit(auto_commit);
        track(&mut self.state, self.id, result)
    }

    pub fn is_auto_commit(&self) -> bool {
        self.connection.auto_commit()
    }

    /// Close the session and its connection. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        event!(Level::DEBUG, session = %self.id, "session closed");
        self.connection.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            event!(Level::WARN, session = %self.id, error = %err, "closing session on drop failed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("dialect", &self.dialect.name())
            .field("state", &self.state)
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}
