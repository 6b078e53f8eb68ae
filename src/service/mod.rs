//! Execution: the executor seam and the query API built on it.

mod executor;
mod query;
pub use executor::{Executor, PgExecutor, QueryOutput, ReturnKind};
pub use query::{Outcome, QueryService};
