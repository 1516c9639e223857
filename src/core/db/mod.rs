/// Database Module
///
/// The single-connection facade and the pieces it is built from.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): the `Connector` seam and the SQLite connector
/// - **Facade** (`facade.rs`): connection ownership, lifecycle and the data operations
/// - **Records** (`record.rs`): insert records, bind parameters, identifier quoting
/// - **Inserts** (`insert.rs`): single-row and bulk inserts with conflict policies
/// - **Query Execution** (`query.rs`): running statements and collecting rows
///
/// ## Error Handling
///
/// All operations report through `DbError`; see `crate::core::error`.
pub mod connection;
pub mod facade;
pub mod insert;
pub mod query;
pub mod record;

pub use connection::{ConnectionState, Connector, SqliteConnector};
pub use facade::Facade;
pub use insert::{BulkInsertReport, ConflictPolicy, RowFailure};
pub use query::{format_value, value_to_json, QueryIntent, QueryOutcome, QueryResult};
pub use record::{quote_identifier, Params, Record, Value};
