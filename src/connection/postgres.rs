//! PostgreSQL backend over the synchronous `postgres` client.

use std::error::Error as StdError;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use postgres::{Client, Config, NoTls};
use tracing::{Level, event};
use crate::core::{DbError, Result, Row, Value};
use super::{Connection, ResultSet};
use super::config::ConnectionConfig;

pub struct PgConnection {
    client: Option<Client>,
    auto_commit: bool,
    in_transaction: bool,
    cursors_opened: u64,
}

impl PgConnection {
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg_config: Config = config
            .url
            .parse()
            .map_err(|e: postgres::Error| DbError::ConfigError(e.to_string()))?;
        if let Some(timeout) = config.connect_timeout_duration() {
            pg_config.connect_timeout(timeout);
        }

        let client = pg_config.connect(NoTls).map_err(classify)?;
        event!(Level::INFO, url = %config.to_url(), "postgres connection opened");

        Ok(Self {
            client: Some(client),
            auto_commit: true,
            in_transaction: false,
            cursors_opened: 0,
        })
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| DbError::ConnectivityError("connection is closed".into()))
    }

    /// Opens a transaction before the first statement when auto-commit is off.
    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction {
            self.client()?.batch_execute("BEGIN").map_err(classify)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn finish(&mut self, command: &str) -> Result<()> {
        if self.auto_commit {
            return Err(DbError::ExecutionError(format!(
                "Cannot {} when auto-commit is enabled",
                command.to_ascii_lowercase()
            )));
        }
        if self.in_transaction {
            self.client()?.batch_execute(command).map_err(classify)?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

impl Connection for PgConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin_if_needed()?;
        let sql = rewrite_placeholders(sql);
        let bound: Vec<PgValue<'_>> = params.iter().map(PgValue).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        self.client()?.execute(sql.as_str(), &refs).map_err(classify)
    }

    /// Rows are read through a server-side cursor, `fetch_size` at a time.
    /// With auto-commit on, the cursor gets its own transaction, committed once
    /// the result set is exhausted or dropped.
    fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[Value],
        fetch_size: usize,
    ) -> Result<Box<dyn ResultSet + 'a>> {
        self.begin_if_needed()?;
        self.cursors_opened += 1;
        let cursor = format!("procdb_cursor_{}", self.cursors_opened);
        let owns_transaction = self.auto_commit;
        let sql = rewrite_placeholders(sql);
        let client = self.client()?;

        let statement = client.prepare(&sql).map_err(classify)?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        if owns_transaction {
            client.batch_execute("BEGIN").map_err(classify)?;
        }
        let bound: Vec<PgValue<'_>> = params.iter().map(PgValue).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        if let Err(err) = client.execute(declare_cursor_sql(&cursor, &sql).as_str(), &refs) {
            if owns_transaction {
                let _ = client.batch_execute("ROLLBACK");
            }
            return Err(classify(err));
        }
        event!(Level::DEBUG, cursor = %cursor, fetch_size, "postgres cursor declared");

        Ok(Box::new(PgResultSet {
            client,
            columns,
            cursor,
            owns_transaction,
            open: true,
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit && !self.auto_commit && self.in_transaction {
            self.client()?.batch_execute("COMMIT").map_err(classify)?;
            self.in_transaction = false;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.close().map_err(classify),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.client.as_ref().is_none_or(Client::is_closed)
    }
}

struct PgResultSet<'a> {
    client: &'a mut Client,
    columns: Vec<String>,
    cursor: String,
    owns_transaction: bool,
    open: bool,
}

impl PgResultSet<'_> {
    fn release(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut sql = format!("CLOSE {};", self.cursor);
        if self.owns_transaction {
            sql.push_str(" COMMIT;");
        }
        self.client.batch_execute(&sql).map_err(classify)
    }
}

impl ResultSet for PgResultSet<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        if !self.open {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(fetch_sql(&self.cursor, max_rows).as_str(), &[])
            .map_err(classify)?;
        if rows.is_empty() {
            self.release()?;
        }
        rows.iter().map(decode_row).collect()
    }
}

impl Drop for PgResultSet<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            event!(Level::WARN, cursor = %self.cursor, error = %err, "failed to close postgres cursor");
        }
    }
}

fn declare_cursor_sql(cursor: &str, query: &str) -> String {
    format!("DECLARE {} NO SCROLL CURSOR FOR {}", cursor, query)
}

fn fetch_sql(cursor: &str, max_rows: usize) -> String {
    format!("FETCH FORWARD {} FROM {}", max_rows.max(1), cursor)
}

/// Server-reported errors reject the statement; everything else is the transport.
fn classify(err: postgres::Error) -> DbError {
    if err.as_db_error().is_some() {
        DbError::ExecutionError(err.to_string())
    } else {
        DbError::ConnectivityError(err.to_string())
    }
}

/// `?` -> `$1, $2, ...`, leaving quoted literals alone.
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '?' if !in_literal => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn decode_row(row: &postgres::Row) -> Result<Row> {
    (0..row.len()).map(|idx| decode_column(row, idx)).collect()
}

fn decode_column(row: &postgres::Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_().clone();
    let decoded = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Boolean)),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map(|v| v.map(|i| Value::Integer(i as i64))),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map(|v| v.map(|i| Value::Integer(i as i64))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Integer)),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map(|v| v.map(|f| Value::Float(f as f64))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(Value::Timestamp)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(|ts| Value::Timestamp(ts.and_utc()))),
        Type::INT4_ARRAY => row.try_get::<_, Option<Vec<i32>>>(idx).map(|v| {
            v.map(|items| Value::Array(items.into_iter().map(|i| Value::Integer(i as i64)).collect()))
        }),
        _ => row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::Text)),
    };

    decoded
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(|e| DbError::MappingError(format!("column {}: {}", row.columns()[idx].name(), e)))
}

/// Binds a [`Value`] according to the parameter type the server inferred.
#[derive(Debug)]
struct PgValue<'a>(&'a Value);

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Integer(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => s.to_sql(ty, out),
            Value::Boolean(b) => b.to_sql(ty, out),
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                _ => ts.to_sql(ty, out),
            },
            Value::Array(items) => {
                let ints: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
                match *ty {
                    Type::INT4_ARRAY => ints
                        .into_iter()
                        .map(i32::try_from)
                        .collect::<std::result::Result<Vec<i32>, _>>()?
                        .to_sql(ty, out),
                    _ => ints.to_sql(ty, out),
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
