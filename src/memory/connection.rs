use std::collections::VecDeque;
use crate::connection::{Connection, ResultSet};
use crate::core::{DbError, Result, Row, Value};
use super::database::MemoryDatabase;
use super::statement::MemoryStatement;

/// A connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    database: MemoryDatabase,
    auto_commit: bool,
    in_transaction: bool,
    closed: bool,
}

impl MemoryConnection {
    pub(crate) fn new(database: MemoryDatabase) -> Self {
        Self {
            database,
            auto_commit: true,
            in_transaction: false,
            closed: false,
        }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(DbError::ConnectivityError("connection is closed".into()));
        }
        self.database.ensure_online()
    }

    /// Parses, logs and runs one statement. Calls return their rows.
    fn run(&mut self, sql: &str, params: &[Value]) -> Result<Option<crate::result::QueryResult>> {
        self.ensure_usable()?;

        let statement = MemoryStatement::parse(sql)?;
        let args = statement.bind(params)?;
        self.database.record(sql, params);
        log::debug!("memory statement: {} ({} param(s))", sql, params.len());

        match statement {
            MemoryStatement::Begin => {
                self.in_transaction = true;
                Ok(None)
            }
            MemoryStatement::Commit => {
                if self.auto_commit {
                    return Err(DbError::ExecutionError(
                        "Cannot commit when auto-commit is enabled".into(),
                    ));
                }
                self.in_transaction = false;
                self.database.record_commit();
                Ok(None)
            }
            MemoryStatement::Rollback => {
                if self.auto_commit {
                    return Err(DbError::ExecutionError(
                        "Cannot rollback when auto-commit is enabled".into(),
                    ));
                }
                self.in_transaction = false;
                self.database.record_rollback();
                Ok(None)
            }
            MemoryStatement::Call { function, .. } => {
                if !self.auto_commit {
                    self.in_transaction = true;
                }
                self.database.invoke(&function, &args).map(Some)
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = self.run(sql, params)?;
        Ok(result.map(|r| r.row_count() as u64).unwrap_or(0))
    }

    fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[Value],
        fetch_size: usize,
    ) -> Result<Box<dyn ResultSet + 'a>> {
        let result = self.run(sql, params)?.ok_or_else(|| {
            DbError::ExecutionError(format!("statement '{}' does not return rows", sql))
        })?;

        Ok(Box::new(MemoryResultSet {
            database: self.database.clone(),
            columns: result.columns,
            rows: result.rows.into(),
            fetch_size: fetch_size.max(1),
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.ensure_usable()?;
        // Switching auto-commit on commits the open transaction.
        if auto_commit && !self.auto_commit && self.in_transaction {
            self.database.record_commit();
            self.in_transaction = false;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            log::debug!("memory connection closed");
        }
        self.closed = true;
        self.in_transaction = false;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Rows of one call, handed out in batches.
pub struct MemoryResultSet {
    database: MemoryDatabase,
    columns: Vec<String>,
    rows: VecDeque<Row>,
    fetch_size: usize,
}

impl MemoryResultSet {
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }
}

impl ResultSet for MemoryResultSet {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        self.database.ensure_online()?;
        self.database.record_fetch();

        let take = max_rows.max(1).min(self.rows.len());
        Ok(self.rows.drain(..take).collect())
    }
}
