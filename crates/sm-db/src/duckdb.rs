//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{returns_rows, Database, Session, StatementOutput};
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::Connection;
use sm_core::{ResultSet, Row, Value};
use std::path::Path;
use std::sync::Mutex;

/// DuckDB database backend
///
/// Holds a root connection; every session is a clone of it, so sessions
/// share one database instance but each has its own transaction context.
pub struct DuckDbBackend {
    root: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB database
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            root: Mutex::new(conn),
        })
    }

    /// Open (or create) a DuckDB database file
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {}", e, path.display())))?;
        Ok(Self {
            root: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn clone_connection(&self) -> DbResult<Connection> {
        let root = self
            .root
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        root.try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn connect(&self) -> DbResult<Box<dyn Session>> {
        let conn = self.clone_connection()?;
        Ok(Box::new(DuckDbSession::new(conn)))
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// One DuckDB connection with explicit transaction tracking
pub struct DuckDbSession {
    conn: Connection,
    in_transaction: bool,
}

impl DuckDbSession {
    /// Wrap an open connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }

    fn control(&mut self, sql: &str) -> DbResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::TransactionError(format!("{sql} failed: {e}")))
    }

    /// Execute SQL synchronously
    fn execute_sync(&mut self, sql: &str) -> DbResult<StatementOutput> {
        if returns_rows(sql) {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = collect_rows(&mut stmt)?;
            Ok(StatementOutput::Rows(ResultSet::new(rows)))
        } else {
            self.conn.execute_batch(sql)?;
            Ok(StatementOutput::NoRows)
        }
    }
}

#[async_trait]
impl Session for DuckDbSession {
    async fn execute(&mut self, sql: &str) -> DbResult<StatementOutput> {
        self.execute_sync(sql)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.control("BEGIN TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        if let Err(e) = self.control("COMMIT") {
            // A failed COMMIT leaves nothing worth keeping.
            let _ = self.conn.execute_batch("ROLLBACK");
            self.in_transaction = false;
            return Err(e);
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let result = self.control("ROLLBACK");
        self.in_transaction = false;
        result
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn close(mut self: Box<Self>) -> DbResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.control("ROLLBACK")?;
        }
        Ok(())
    }
}

impl Drop for DuckDbSession {
    fn drop(&mut self) {
        if self.in_transaction {
            log::debug!("Rolling back open transaction on session drop");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

/// Execute a prepared statement and collect all rows as typed values.
///
/// DuckDB panics on `stmt.column_count()` before execution, so the column
/// count is read from each row instead.
fn collect_rows(stmt: &mut duckdb::Statement<'_>) -> DbResult<Vec<Row>> {
    stmt.query_map([], |row| {
        let col_count = row.as_ref().column_count();
        (0..col_count)
            .map(|i| row.get::<_, DuckValue>(i).map(convert_value))
            .collect::<Result<Row, _>>()
    })?
    .collect::<Result<Vec<_>, _>>()
    .map_err(DbError::from)
}

/// Map a DuckDB value onto the engine-neutral cell type.
///
/// Integers that fit in 64 bits stay integers; dates and timestamps are
/// rendered in ISO form; anything else falls back to its debug rendering.
pub(crate) fn convert_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(n) => Value::Integer(n.into()),
        DuckValue::SmallInt(n) => Value::Integer(n.into()),
        DuckValue::Int(n) => Value::Integer(n.into()),
        DuckValue::BigInt(n) => Value::Integer(n),
        DuckValue::UTinyInt(n) => Value::Integer(n.into()),
        DuckValue::USmallInt(n) => Value::Integer(n.into()),
        DuckValue::UInt(n) => Value::Integer(n.into()),
        DuckValue::UBigInt(n) => {
            i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Integer)
        }
        DuckValue::HugeInt(n) => {
            i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Integer)
        }
        DuckValue::Float(x) => Value::Real(x.into()),
        DuckValue::Double(x) => Value::Real(x),
        DuckValue::Decimal(d) => Value::Text(d.to_string()),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Enum(s) => Value::Text(s),
        DuckValue::Date32(days) => render_date(days),
        DuckValue::Timestamp(unit, raw) => render_timestamp(unit, raw),
        other => Value::Text(format!("{:?}", other)),
    }
}

// 1970-01-01 counted from 0001-01-01 (CE)
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn render_date(days: i32) -> Value {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
        .map_or_else(
            || Value::Text(days.to_string()),
            |d| Value::Text(d.format("%Y-%m-%d").to_string()),
        )
}

fn render_timestamp(unit: TimeUnit, raw: i64) -> Value {
    let micros = match unit {
        TimeUnit::Second => raw.checked_mul(1_000_000),
        TimeUnit::Millisecond => raw.checked_mul(1_000),
        TimeUnit::Microsecond => Some(raw),
        TimeUnit::Nanosecond => Some(raw / 1_000),
    };
    micros
        .and_then(chrono::DateTime::from_timestamp_micros)
        .map_or_else(
            || Value::Text(raw.to_string()),
            |ts| Value::Text(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        )
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
