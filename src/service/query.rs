//! QueryService: the caller-facing insert/update/delete/fetch API over one schema.

use crate::config::Schema;
use crate::error::QueryError;
use crate::instance::Instance;
use crate::service::{Executor, ReturnKind};
use crate::settings::QuerySettings;
use crate::sql::{QueryBuilder, QueryRequest, StatementKind};
use std::sync::Arc;

/// Result of [`QueryService::execute`], one variant per statement kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Inserted(Instance),
    Updated(Vec<Instance>),
    Deleted(u64),
    Fetched(Vec<Instance>),
}

pub struct QueryService<E> {
    schema: Arc<Schema>,
    executor: E,
    settings: QuerySettings,
}

impl<E: Executor> QueryService<E> {
    pub fn new(schema: Arc<Schema>, executor: E, settings: QuerySettings) -> Self {
        QueryService {
            schema,
            executor,
            settings,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Assemble without executing.
    pub fn prepare(
        &self,
        entity: &str,
        kind: StatementKind,
        request: &QueryRequest,
    ) -> Result<QueryBuilder<'_>, QueryError> {
        QueryBuilder::new(&self.schema, &self.settings, entity, kind, request)
    }

    /// Run whichever statement kind the request's inputs imply.
    pub async fn execute(&self, entity: &str, request: QueryRequest) -> Result<Outcome, QueryError> {
        Ok(match StatementKind::infer(&request) {
            StatementKind::Insert => Outcome::Inserted(self.insert(entity, request).await?),
            StatementKind::Update => Outcome::Updated(self.update(entity, request).await?),
            StatementKind::Delete => Outcome::Deleted(self.delete(entity, request).await?),
            StatementKind::Select => Outcome::Fetched(self.fetch(entity, request).await?),
        })
    }

    pub async fn insert(&self, entity: &str, request: QueryRequest) -> Result<Instance, QueryError> {
        let builder = self.prepare(entity, StatementKind::Insert, &request)?;
        self.instances(&builder, &request)
            .await?
            .into_iter()
            .next()
            .ok_or(QueryError::Store(sqlx::Error::RowNotFound))
    }

    pub async fn update(&self, entity: &str, request: QueryRequest) -> Result<Vec<Instance>, QueryError> {
        let builder = self.prepare(entity, StatementKind::Update, &request)?;
        self.instances(&builder, &request).await
    }

    /// Update expected to touch at most one row. More than one is reported after the fact.
    pub async fn update_one(&self, entity: &str, request: QueryRequest) -> Result<Option<Instance>, QueryError> {
        let mut updated = self.update(entity, request).await?;
        if updated.len() > 1 {
            tracing::error!(entity = %entity, count = updated.len(), "update_one affected multiple rows");
            return Err(QueryError::MultipleRowsAffected {
                entity: entity.to_string(),
                count: updated.len(),
            });
        }
        Ok(updated.pop())
    }

    pub async fn delete(&self, entity: &str, request: QueryRequest) -> Result<u64, QueryError> {
        let builder = self.prepare(entity, StatementKind::Delete, &request)?;
        let statement = builder.statement();
        tracing::debug!(sql = %statement.sql, params = ?statement.params, "query");
        let output = self
            .executor
            .execute_query(&statement, self.settings.timeout_for(request.timeout), ReturnKind::RowCount)
            .await?;
        Ok(output.row_count())
    }

    pub async fn fetch(&self, entity: &str, request: QueryRequest) -> Result<Vec<Instance>, QueryError> {
        let builder = self.prepare(entity, StatementKind::Select, &request)?;
        let decoded = self.instances(&builder, &request).await?;
        Ok(builder.apply_window(decoded))
    }

    pub async fn fetch_one(&self, entity: &str, mut request: QueryRequest) -> Result<Option<Instance>, QueryError> {
        if request.joins.is_empty() {
            request.limit = Some(1);
        }
        let mut found = self.fetch(entity, request).await?;
        if found.len() > 1 {
            tracing::error!(entity = %entity, count = found.len(), "fetch_one matched multiple instances");
            return Err(QueryError::MultipleResults {
                entity: entity.to_string(),
                count: found.len(),
            });
        }
        Ok(found.pop())
    }

    async fn instances(&self, builder: &QueryBuilder<'_>, request: &QueryRequest) -> Result<Vec<Instance>, QueryError> {
        let statement = builder.statement();
        tracing::debug!(sql = %statement.sql, params = ?statement.params, "query");
        let rows = self
            .executor
            .execute_query(&statement, self.settings.timeout_for(request.timeout), ReturnKind::Rows)
            .await?
            .into_rows();
        builder.row_mapper().decode(&rows)
    }
}
