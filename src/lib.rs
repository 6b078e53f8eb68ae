//! Architect ORM: schema-driven SQL statement assembly and row mapping for PostgreSQL.

pub mod config;
pub mod error;
pub mod instance;
pub mod mapper;
pub mod service;
pub mod settings;
pub mod sql;
pub mod value;

pub use config::{load_from_path, resolve, resolve_json, EntityDescriptor, Schema, SchemaConfig};
pub use error::{ConfigError, QueryError};
pub use instance::{Instance, Related};
pub use mapper::{KeyPath, PathKey, PropertyRef};
pub use service::{Executor, Outcome, PgExecutor, QueryOutput, QueryService, ReturnKind};
pub use settings::QuerySettings;
pub use sql::{
    ComparisonOp, Filter, Join, PageDescriptor, Predicate, QueryRequest, RawWhere, SortDescriptor,
    SortOrder, Statement, StatementKind, StorageValue,
};
pub use value::{Document, Value};
