//! Database and session trait definitions

use crate::error::DbResult;
use async_trait::async_trait;
use sm_core::ResultSet;

/// What a successfully executed statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    /// The statement returned rows (possibly zero of them)
    Rows(ResultSet),
    /// The statement does not return rows (DDL, DML, SET, ...)
    NoRows,
}

impl StatementOutput {
    /// Rows, if the statement returned any result set
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            StatementOutput::Rows(rs) => Some(rs),
            StatementOutput::NoRows => None,
        }
    }

    /// Consume and return the result set, if any
    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            StatementOutput::Rows(rs) => Some(rs),
            StatementOutput::NoRows => None,
        }
    }
}

/// Connection factory for sqlmend
///
/// Each call to [`connect`](Database::connect) yields an exclusive session;
/// sessions are never shared between instances.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a new session with its own connection
    async fn connect(&self) -> DbResult<Box<dyn Session>>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}

/// One connection with at most one open transaction
///
/// Implementations must roll back an open transaction when dropped.
#[async_trait]
pub trait Session: Send {
    /// Execute one statement, fetching rows if it returns any
    async fn execute(&mut self, sql: &str) -> DbResult<StatementOutput>;

    /// Start a transaction
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> DbResult<()>;

    /// Whether a transaction is currently open
    fn in_transaction(&self) -> bool;

    /// Close the session, rolling back anything still open
    async fn close(self: Box<Self>) -> DbResult<()>;
}

/// Leading keywords of statements that produce a result set
const ROW_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "SHOW", "DESCRIBE", "EXPLAIN", "PRAGMA", "TABLE", "FROM",
    "SUMMARIZE", "CALL",
];

/// Whether a statement is expected to return rows
///
/// Looks at the first keyword after leading whitespace, comments and
/// parentheses. DML with a `RETURNING` clause also returns rows.
pub fn returns_rows(sql: &str) -> bool {
    let body = strip_leading_noise(sql);
    let keyword: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    if ROW_KEYWORDS.contains(&keyword.as_str()) {
        return true;
    }
    matches!(keyword.as_str(), "INSERT" | "UPDATE" | "DELETE")
        && body.to_ascii_uppercase().contains("RETURNING")
}

fn strip_leading_noise(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            return trimmed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_rows_keywords() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  select * from t"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("(SELECT 1) UNION (SELECT 2)"));
        assert!(!returns_rows("CREATE TABLE t (id INT)"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
        assert!(!returns_rows("DROP TABLE IF EXISTS t"));
        assert!(!returns_rows(""));
    }

    #[test]
    fn test_returns_rows_skips_comments() {
        assert!(returns_rows("-- fetch\nSELECT 1"));
        assert!(returns_rows("/* a */ /* b */ SELECT 1"));
        assert!(!returns_rows("-- only a comment"));
    }

    #[test]
    fn test_returning_clause() {
        assert!(returns_rows("INSERT INTO t VALUES (1) RETURNING id"));
        assert!(returns_rows("delete from t where id = 1 returning *"));
    }
}
