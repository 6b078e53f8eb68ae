//! Typed errors for schema loading and statement assembly/execution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} property {property}")]
    InvalidPrimaryKey { entity: String, property: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unknown column '{property}' on entity {entity}")]
    UnknownColumn { entity: String, property: String },
    #[error("invalid column reference '{property}' on entity {entity}: {reason}")]
    InvalidColumnReference {
        entity: String,
        property: String,
        reason: String,
    },
    #[error("invalid storage value for '{property}': {reason}")]
    InvalidStorageValue { property: String, reason: String },
    #[error("refusing to {operation} every row of {entity}: supply a predicate or opt in to all rows")]
    UnsafeBulkModification {
        operation: &'static str,
        entity: String,
    },
    #[error("unsupported query shape: {0}")]
    UnsupportedQueryShape(String),
    #[error("invalid page descriptor: {0}")]
    InvalidPageDescriptor(String),
    #[error("expected at most one {entity} but fetched {count}")]
    MultipleResults { entity: String, count: usize },
    #[error("expected to modify at most one {entity} but {count} rows were affected")]
    MultipleRowsAffected { entity: String, count: usize },
    #[error("statement references unbound parameter :{0}")]
    UnknownParameter(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("statement timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("database: {0}")]
    Store(#[from] sqlx::Error),
}

impl QueryError {
    /// Request-level failures the caller can correct by changing the request.
    /// Cardinality faults and store errors are not in this class.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownEntity(_)
                | QueryError::UnknownColumn { .. }
                | QueryError::InvalidColumnReference { .. }
                | QueryError::InvalidStorageValue { .. }
                | QueryError::UnsafeBulkModification { .. }
                | QueryError::UnsupportedQueryShape(_)
                | QueryError::InvalidPageDescriptor(_)
                | QueryError::UnknownParameter(_)
                | QueryError::BadRequest(_)
        )
    }

    /// Short machine-readable code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Config(_) => "config_error",
            QueryError::UnknownEntity(_) => "unknown_entity",
            QueryError::UnknownColumn { .. } => "unknown_column",
            QueryError::InvalidColumnReference { .. } => "invalid_column_reference",
            QueryError::InvalidStorageValue { .. } => "invalid_storage_value",
            QueryError::UnsafeBulkModification { .. } => "unsafe_bulk_modification",
            QueryError::UnsupportedQueryShape(_) => "unsupported_query_shape",
            QueryError::InvalidPageDescriptor(_) => "invalid_page_descriptor",
            QueryError::MultipleResults { .. } => "multiple_results",
            QueryError::MultipleRowsAffected { .. } => "multiple_rows_affected",
            QueryError::UnknownParameter(_) => "unknown_parameter",
            QueryError::BadRequest(_) => "bad_request",
            QueryError::Timeout(_) => "timeout",
            QueryError::Store(_) => "database_error",
        }
    }
}
