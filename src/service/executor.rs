//! Statement execution against PostgreSQL.

use crate::error::QueryError;
use crate::mapper::Row;
use crate::sql::{Statement, StorageValue};
use async_trait::async_trait;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Decode, PgPool, Type};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Rows,
    RowCount,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    RowCount(u64),
}

impl QueryOutput {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::RowCount(_) => Vec::new(),
        }
    }

    pub fn row_count(&self) -> u64 {
        match self {
            QueryOutput::Rows(rows) => rows.len() as u64,
            QueryOutput::RowCount(n) => *n,
        }
    }
}

/// Runs one fully assembled statement. The only suspension point of a query.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute_query(
        &self,
        statement: &Statement,
        timeout: Option<Duration>,
        returns: ReturnKind,
    ) -> Result<QueryOutput, QueryError>;
}

#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn execute_query(
        &self,
        statement: &Statement,
        timeout: Option<Duration>,
        returns: ReturnKind,
    ) -> Result<QueryOutput, QueryError> {
        let (sql, values) = statement.to_positional()?;
        let run = async {
            let mut query = sqlx::query(&sql);
            for v in values {
                query = query.bind(v);
            }
            match returns {
                ReturnKind::Rows => {
                    let rows = query.fetch_all(&self.pool).await?;
                    Ok::<_, sqlx::Error>(QueryOutput::Rows(rows.iter().map(row_to_storage).collect()))
                }
                ReturnKind::RowCount => {
                    let done = query.execute(&self.pool).await?;
                    Ok(QueryOutput::RowCount(done.rows_affected()))
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| QueryError::Timeout(limit))?
                .map_err(QueryError::from),
            None => run.await.map_err(QueryError::from),
        }
    }
}

fn row_to_storage(row: &PgRow) -> Row {
    use sqlx::{Column, Row as _};
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.ordinal())))
        .collect()
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    use sqlx::Row as _;
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

fn cell_to_value(row: &PgRow, i: usize) -> StorageValue {
    if let Some(n) = get::<i16>(row, i) {
        return StorageValue::I64(n.into());
    }
    if let Some(n) = get::<i32>(row, i) {
        return StorageValue::I64(n.into());
    }
    if let Some(n) = get::<i64>(row, i) {
        return StorageValue::I64(n);
    }
    if let Some(n) = get::<f32>(row, i) {
        return StorageValue::F64(n.into());
    }
    if let Some(n) = get::<f64>(row, i) {
        return StorageValue::F64(n);
    }
    if let Some(b) = get::<bool>(row, i) {
        return StorageValue::Bool(b);
    }
    if let Some(u) = get::<uuid::Uuid>(row, i) {
        return StorageValue::Uuid(u);
    }
    if let Some(t) = get::<chrono::NaiveDateTime>(row, i) {
        return StorageValue::Timestamp(t);
    }
    if let Some(t) = get::<chrono::DateTime<chrono::Utc>>(row, i) {
        return StorageValue::Timestamp(t.naive_utc());
    }
    if let Some(d) = get::<chrono::NaiveDate>(row, i) {
        return StorageValue::Timestamp(d.and_time(chrono::NaiveTime::MIN));
    }
    if let Some(s) = get::<String>(row, i) {
        return StorageValue::String(s);
    }
    if let Some(j) = get::<serde_json::Value>(row, i) {
        return StorageValue::Json(j);
    }
    StorageValue::Null
}
