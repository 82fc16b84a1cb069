//! sm-core - Core library for sqlmend
//!
//! This crate provides the shared types used across all sqlmend components:
//! correction instances and their JSON-lines dataset, typed result sets,
//! repair results, configuration parsing, and database credentials.

pub mod config;
pub mod credentials;
pub mod error;
pub mod instance;
pub mod repair_result;
pub mod result_set;
pub(crate) mod serde_helpers;

pub use config::{
    Config, DatabaseConfig, DbType, GeneratorConfig, RepairConfig, SamplingParams,
};
pub use credentials::Credentials;
pub use error::{CoreError, CoreResult};
pub use instance::{Dataset, Instance, InstanceId};
pub use repair_result::RepairResult;
pub use result_set::{ResultSet, Row, Value};
