//! CLI command implementations

pub(crate) mod collect;
pub(crate) mod common;
pub(crate) mod eval;
pub(crate) mod validate;
