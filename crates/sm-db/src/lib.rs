//! sm-db - Database abstraction layer for sqlmend
//!
//! This crate provides the `Database` and `Session` traits and their
//! DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::{DuckDbBackend, DuckDbSession};
pub use error::{DbError, DbResult};
pub use traits::{returns_rows, Database, Session, StatementOutput};
