//! Example consumer: loads a schema file and runs a few queries against PostgreSQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Expects `DATABASE_URL` and `SCHEMA_PATH` (defaults to `tests/fixtures/library.json`).

use architect_orm::{
    load_from_path, ComparisonOp, PgExecutor, Predicate, QueryRequest, QueryService, QuerySettings, SortDescriptor,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Book {
    id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    id: i64,
    name: String,
    books: Vec<Book>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("architect_orm=debug")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/architect".into());
    let schema_path =
        std::env::var("SCHEMA_PATH").unwrap_or_else(|_| "tests/fixtures/library.json".into());

    let schema = load_from_path(&schema_path).await?;
    tracing::info!(entities = schema.len(), path = %schema_path, "schema loaded");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let service = QueryService::new(Arc::new(schema), PgExecutor::new(pool), QuerySettings::from_env()?);

    let request = QueryRequest::new()
        .filter(Predicate::compare("name", ComparisonOp::Like, "%"))
        .sort(SortDescriptor::asc("name"))
        .returning(["name"])
        .join("books", QueryRequest::new().returning(["title"]))
        .limit(10);
    for instance in service.fetch("Author", request).await? {
        let author: Author = instance.deserialize()?;
        tracing::info!(id = author.id, name = %author.name, books = author.books.len(), "author");
        for book in &author.books {
            tracing::info!(id = book.id, title = %book.title, "  book");
        }
    }
    Ok(())
}
