//! Database layer: named sources, statement execution, row materialization.

pub mod decode;
pub mod executor;
pub mod source;

pub use decode::materialize;
pub use executor::{DEFAULT_QUERY_TIMEOUT, QueryContext, RowSet, execute};
pub use source::{DatabaseType, DbPool, Source, SourceRegistry};
