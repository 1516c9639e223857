// Core infrastructure modules
pub mod config;
pub mod core;

// Process-wide convenience API
pub mod db;

#[cfg(test)]
mod test_utils;

pub use crate::config::ConnectionConfig;
pub use crate::core::db::{
    BulkInsertReport, ConflictPolicy, ConnectionState, Facade, Params, QueryIntent, QueryOutcome,
    QueryResult, Record, Value,
};
pub use crate::core::{DbError, Result};
