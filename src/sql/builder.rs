//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved entity and a request.

use crate::config::{EntityDescriptor, PropertyDescriptor, Schema};
use crate::error::QueryError;
use crate::instance::Instance;
use crate::mapper::{column_mapper, ColumnNameOptions, PropertyRef, RowMapper};
use crate::settings::QuerySettings;
use crate::sql::{
    placeholder, ComparisonOp, Filter, Fragments, PageDescriptor, Params, Predicate, QueryRequest,
    SortOrder, Statement, StatementKind, Translator,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Quote identifier for PostgreSQL (identifiers come from validated schema config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// One statement under construction. Created per call, discarded after execution.
pub struct QueryBuilder<'a> {
    schema: &'a Schema,
    entity: Arc<EntityDescriptor>,
    kind: StatementKind,
    cast_parameters: bool,
    mapper: RowMapper,
    params: Params,
    fragments: Fragments,
    /// Applied to decoded instances when joins make SQL LIMIT/OFFSET count rows instead.
    window: Option<(usize, Option<usize>)>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(
        schema: &'a Schema,
        settings: &QuerySettings,
        entity: &str,
        kind: StatementKind,
        request: &QueryRequest,
    ) -> Result<Self, QueryError> {
        let entity = Arc::clone(schema.entity(entity)?);
        if !request.joins.is_empty() {
            if kind != StatementKind::Select {
                return Err(QueryError::UnsupportedQueryShape(
                    "joins only apply to selects".into(),
                ));
            }
            if request.page.is_some() {
                return Err(QueryError::UnsupportedQueryShape(
                    "page descriptors cannot be combined with joins".into(),
                ));
            }
        }
        let mapper = match kind {
            StatementKind::Select => RowMapper::build(schema, &entity, &request.returning, &request.joins)?,
            StatementKind::Insert | StatementKind::Update => RowMapper::root(schema, &entity, &request.returning)?,
            StatementKind::Delete => RowMapper::root(schema, &entity, &[])?,
        };
        let mut builder = QueryBuilder {
            schema,
            entity,
            kind,
            cast_parameters: settings.cast_parameters,
            mapper,
            params: Params::new(),
            fragments: Fragments::default(),
            window: None,
        };
        builder.fragments.table = builder.mapper.from_clause();
        match kind {
            StatementKind::Insert => builder.build_insert(request)?,
            StatementKind::Update => builder.build_update(request)?,
            StatementKind::Delete => builder.build_delete(request)?,
            StatementKind::Select => builder.build_select(settings, request)?,
        }
        Ok(builder)
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    pub fn row_mapper(&self) -> &RowMapper {
        &self.mapper
    }

    pub fn statement(&self) -> Statement {
        Statement {
            kind: self.kind,
            sql: self.fragments.render(self.kind),
            params: self.params.clone(),
        }
    }

    /// Offset/limit over decoded instances (joined selects only).
    pub fn apply_window(&self, instances: Vec<Instance>) -> Vec<Instance> {
        match self.window {
            None => instances,
            Some((offset, limit)) => {
                let rest = instances.into_iter().skip(offset);
                match limit {
                    Some(n) => rest.take(n).collect(),
                    None => rest.collect(),
                }
            }
        }
    }

    fn root_table(&self) -> String {
        self.mapper.root_node().table_ref.clone()
    }

    fn translate(&mut self, filter: &Filter) -> Result<String, QueryError> {
        let table = self.root_table();
        let t = Translator {
            schema: self.schema,
            entity: &self.entity,
            table: &table,
            namespaced: self.mapper.is_joined(),
            cast_parameters: self.cast_parameters,
        };
        t.translate(filter, &mut self.params)
    }

    /// Column + placeholder pairs for the request's values.
    fn assignments(&mut self, request: &QueryRequest) -> Result<Vec<(String, String)>, QueryError> {
        if request.values.is_empty() {
            return Err(QueryError::BadRequest(format!(
                "{} of {} requires at least one value",
                if self.kind == StatementKind::Insert { "insert" } else { "update" },
                self.entity.name
            )));
        }
        let table = self.root_table();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(request.values.len());
        for (name, value) in &request.values {
            if !seen.insert(name.as_str()) {
                return Err(QueryError::BadRequest(format!("duplicate value for {}", name)));
            }
            let m = column_mapper(self.schema, &table, &self.entity, &PropertyRef::Name(name.clone()))?;
            let stored = m.convert_value_for_storage(value)?;
            let p = self.params.push(stored);
            out.push((
                m.column_name(ColumnNameOptions::default()),
                placeholder(&p, &m, self.cast_parameters),
            ));
        }
        Ok(out)
    }

    fn require_target(&mut self, request: &QueryRequest, operation: &'static str) -> Result<(), QueryError> {
        match &request.filter {
            Some(filter) => {
                let w = self.translate(filter)?;
                self.fragments.where_ = Some(w);
                Ok(())
            }
            None if request.all_rows => {
                tracing::warn!(entity = %self.entity.name, operation, "statement targets all rows");
                Ok(())
            }
            None => Err(QueryError::UnsafeBulkModification {
                operation,
                entity: self.entity.name.clone(),
            }),
        }
    }

    fn build_insert(&mut self, request: &QueryRequest) -> Result<(), QueryError> {
        for (column, value) in self.assignments(request)? {
            self.fragments.columns.push(column);
            self.fragments.values.push(value);
        }
        self.fragments.returning = self.mapper.select_list();
        Ok(())
    }

    fn build_update(&mut self, request: &QueryRequest) -> Result<(), QueryError> {
        // checked before binding anything so a refused update allocates no parameters
        if request.filter.is_none() && !request.all_rows {
            return Err(QueryError::UnsafeBulkModification {
                operation: "update",
                entity: self.entity.name.clone(),
            });
        }
        self.fragments.sets = self
            .assignments(request)?
            .into_iter()
            .map(|(c, v)| format!("{} = {}", c, v))
            .collect();
        self.require_target(request, "update")?;
        self.fragments.returning = self.mapper.select_list();
        Ok(())
    }

    fn build_delete(&mut self, request: &QueryRequest) -> Result<(), QueryError> {
        self.require_target(request, "delete")
    }

    /// Synthetic ordering and bound predicate for a page descriptor.
    fn page_terms(&self, page: &PageDescriptor) -> Result<(PropertyRef, Option<Predicate>), QueryError> {
        let attribute = match self.entity.property(&page.property) {
            Some(PropertyDescriptor::Attribute(a)) => a,
            Some(PropertyDescriptor::Relationship(_)) => {
                return Err(QueryError::InvalidPageDescriptor(format!(
                    "{}.{} is a relationship, not a pageable attribute",
                    self.entity.name, page.property
                )))
            }
            None => {
                return Err(QueryError::InvalidPageDescriptor(format!(
                    "{} has no property {}",
                    self.entity.name, page.property
                )))
            }
        };
        let property = PropertyRef::Name(page.property.clone());
        let bound = match page.after.as_ref().filter(|v| !v.is_null()) {
            None => None,
            Some(v) if attribute.accepts(v) => {
                let op = match page.order {
                    SortOrder::Ascending => ComparisonOp::Gt,
                    SortOrder::Descending => ComparisonOp::Lt,
                };
                Some(Predicate::compare(property.clone(), op, v.clone()))
            }
            Some(v) => {
                return Err(QueryError::InvalidPageDescriptor(format!(
                    "{} bound cannot be assigned to {}.{} ({:?})",
                    v.type_name(),
                    self.entity.name,
                    page.property,
                    attribute.kind
                )))
            }
        };
        Ok((property, bound))
    }

    fn order_term(&self, property: &PropertyRef, order: SortOrder) -> Result<String, QueryError> {
        let table = self.root_table();
        let m = column_mapper(self.schema, &table, &self.entity, property)?;
        let opts = ColumnNameOptions {
            with_table_namespace: self.mapper.is_joined(),
            ..Default::default()
        };
        Ok(format!("{} {}", m.column_name(opts), order.keyword()))
    }

    fn build_select(&mut self, settings: &QuerySettings, request: &QueryRequest) -> Result<(), QueryError> {
        let mut where_parts = Vec::new();
        if let Some(filter) = &request.filter {
            where_parts.push(self.translate(filter)?);
        }

        let mut order = Vec::new();
        if let Some(page) = &request.page {
            let (property, bound) = self.page_terms(page)?;
            order.push(self.order_term(&property, page.order)?);
            if let Some(bound) = bound {
                where_parts.push(self.translate(&Filter::Predicate(bound))?);
            }
        }
        for sort in &request.sort {
            order.push(self.order_term(&sort.property, sort.order)?);
        }

        where_parts.extend(
            self.mapper
                .join_where_parts(self.schema, self.cast_parameters, &mut self.params)?,
        );

        if self.mapper.is_joined() {
            // keeps every root's rows contiguous for single-pass decoding
            let pk = PropertyRef::Name(self.entity.primary_key.clone());
            order.push(self.order_term(&pk, SortOrder::Ascending)?);
            self.window = Some((
                request.offset.unwrap_or(0) as usize,
                request.limit.map(|n| n.min(settings.max_limit) as usize),
            ));
        } else {
            self.fragments.limit = request.limit.map(|n| n.min(settings.max_limit));
            self.fragments.offset = request.offset;
        }

        self.fragments.columns = self.mapper.select_list();
        self.fragments.where_ = match where_parts.len() {
            0 => None,
            1 => where_parts.pop(),
            _ => Some(
                where_parts
                    .iter()
                    .map(|p| format!("({})", p))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        };
        self.fragments.order = order;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{test_schema, KeyPath, PathKey};
    use crate::sql::{RawWhere, SortDescriptor, StorageValue};
    use crate::value::{Document, Value};
    use serde_json::json;

    fn settings() -> QuerySettings {
        QuerySettings {
            cast_parameters: false,
            ..QuerySettings::default()
        }
    }

    fn build(kind: StatementKind, entity: &str, request: &QueryRequest) -> Result<Statement, QueryError> {
        let schema = test_schema();
        QueryBuilder::new(&schema, &settings(), entity, kind, request).map(|b| b.statement())
    }

    #[test]
    fn insert_returns_primary_key_first() {
        let request = QueryRequest::new()
            .set("title", "Dune")
            .set("status", Value::Enum("Draft".into()))
            .set("metadata", Document::new(json!({"pages": 412})))
            .returning(["title"]);
        let s = build(StatementKind::Insert, "Book", &request).unwrap();
        assert_eq!(
            s.sql,
            "INSERT INTO \"books\" (\"title\", \"status\", \"metadata\") VALUES (:p1, :p2, :p3) RETURNING \"id\", \"title\""
        );
        assert_eq!(s.params.get("p2"), Some(&StorageValue::String("draft".into())));
        assert_eq!(s.params.get("p3"), Some(&StorageValue::Json(json!({"pages": 412}))));
    }

    #[test]
    fn insert_requires_values() {
        let err = build(StatementKind::Insert, "Book", &QueryRequest::new()).unwrap_err();
        assert!(matches!(err, QueryError::BadRequest(_)));
    }

    #[test]
    fn insert_belongs_to_writes_foreign_key() {
        let request = QueryRequest::new().set("title", "Emma").set("author", 7);
        let s = build(StatementKind::Insert, "Book", &request).unwrap();
        assert!(s.sql.starts_with("INSERT INTO \"books\" (\"title\", \"author_id\")"));
        assert_eq!(s.params.get("p2"), Some(&StorageValue::I64(7)));
    }

    #[test]
    fn insert_rejects_to_many_value() {
        let request = QueryRequest::new().set("books", 1);
        let err = build(StatementKind::Insert, "Author", &request).unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnReference { .. }));
    }

    #[test]
    fn update_without_filter_is_refused() {
        let request = QueryRequest::new().set("title", "x");
        let err = build(StatementKind::Update, "Book", &request).unwrap_err();
        assert!(matches!(err, QueryError::UnsafeBulkModification { operation: "update", .. }));

        let s = build(StatementKind::Update, "Book", &request.all_rows()).unwrap();
        assert_eq!(
            s.sql,
            "UPDATE \"books\" SET \"title\" = :p1 RETURNING \"id\", \"title\", \"status\", \"metadata\", \"published_at\""
        );
    }

    #[test]
    fn update_with_filter() {
        let request = QueryRequest::new()
            .set("title", "Dune")
            .filter(Predicate::eq("id", 4))
            .returning(["title"]);
        let s = build(StatementKind::Update, "Book", &request).unwrap();
        assert_eq!(
            s.sql,
            "UPDATE \"books\" SET \"title\" = :p1 WHERE \"id\" = :p2 RETURNING \"id\", \"title\""
        );
    }

    #[test]
    fn delete_guard_and_opt_in() {
        let err = build(StatementKind::Delete, "Book", &QueryRequest::new()).unwrap_err();
        assert!(matches!(err, QueryError::UnsafeBulkModification { operation: "delete", .. }));
        let s = build(StatementKind::Delete, "Book", &QueryRequest::new().all_rows()).unwrap();
        assert_eq!(s.sql, "DELETE FROM \"books\"");
        let s = build(
            StatementKind::Delete,
            "Book",
            &QueryRequest::new().filter(Predicate::eq("id", 1)),
        )
        .unwrap();
        assert_eq!(s.sql, "DELETE FROM \"books\" WHERE \"id\" = :p1");
    }

    #[test]
    fn ascending_page_bounds_with_greater_than() {
        let request = QueryRequest::new()
            .filter(Predicate::eq("status", Value::Enum("Published".into())))
            .page(PageDescriptor::new("published_at", SortOrder::Ascending).after(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .unwrap(),
            ))
            .sort(SortDescriptor::asc("title"))
            .returning(["title"])
            .limit(20);
        let s = build(StatementKind::Select, "Book", &request).unwrap();
        assert_eq!(
            s.sql,
            "SELECT \"id\", \"title\" FROM \"books\" WHERE (\"status\" = :p1) AND (\"published_at\" > :p2) ORDER BY \"published_at\" ASC, \"title\" ASC LIMIT 20"
        );
    }

    #[test]
    fn descending_page_bounds_with_less_than() {
        let request = QueryRequest::new()
            .page(PageDescriptor::new("id", SortOrder::Descending).after(100))
            .returning(["title"]);
        let s = build(StatementKind::Select, "Book", &request).unwrap();
        assert_eq!(
            s.sql,
            "SELECT \"id\", \"title\" FROM \"books\" WHERE \"id\" < :p1 ORDER BY \"id\" DESC"
        );
    }

    #[test]
    fn page_without_bound_only_orders() {
        let request = QueryRequest::new()
            .page(PageDescriptor::new("title", SortOrder::Ascending))
            .returning(["title"]);
        let s = build(StatementKind::Select, "Book", &request).unwrap();
        assert_eq!(s.sql, "SELECT \"id\", \"title\" FROM \"books\" ORDER BY \"title\" ASC");
        assert!(s.params.is_empty());
    }

    #[test]
    fn invalid_page_descriptors() {
        let unknown = QueryRequest::new().page(PageDescriptor::new("isbn", SortOrder::Ascending));
        assert!(matches!(
            build(StatementKind::Select, "Book", &unknown),
            Err(QueryError::InvalidPageDescriptor(_))
        ));
        let wrong_type = QueryRequest::new().page(PageDescriptor::new("id", SortOrder::Ascending).after("ten"));
        assert!(matches!(
            build(StatementKind::Select, "Book", &wrong_type),
            Err(QueryError::InvalidPageDescriptor(_))
        ));
        let relation = QueryRequest::new().page(PageDescriptor::new("author", SortOrder::Ascending));
        assert!(matches!(
            build(StatementKind::Select, "Book", &relation),
            Err(QueryError::InvalidPageDescriptor(_))
        ));
    }

    #[test]
    fn joins_and_paging_are_exclusive() {
        let request = QueryRequest::new()
            .page(PageDescriptor::new("isbn", SortOrder::Ascending))
            .join("books", QueryRequest::new());
        // shape is rejected before the (also invalid) page property is looked at
        assert!(matches!(
            build(StatementKind::Select, "Author", &request),
            Err(QueryError::UnsupportedQueryShape(_))
        ));
    }

    #[test]
    fn joined_select_combines_filters_in_tree_order() {
        let request = QueryRequest::new()
            .filter(Predicate::eq("name", "Herbert"))
            .returning(["name"])
            .join(
                "books",
                QueryRequest::new()
                    .returning(["title"])
                    .filter(Predicate::eq("status", Value::Enum("Published".into()))),
            )
            .limit(5);
        let schema = test_schema();
        let b = QueryBuilder::new(&schema, &settings(), "Author", StatementKind::Select, &request).unwrap();
        let s = b.statement();
        assert_eq!(
            s.sql,
            "SELECT \"t0\".\"id\" AS \"t0_id\", \"t0\".\"name\" AS \"t0_name\", \"t1\".\"id\" AS \"t1_id\", \"t1\".\"title\" AS \"t1_title\" \
             FROM \"authors\" AS \"t0\" LEFT OUTER JOIN \"books\" AS \"t1\" ON \"t1\".\"author_id\" = \"t0\".\"id\" \
             WHERE (\"t0\".\"name\" = :p1) AND (\"t1\".\"status\" = :p2) ORDER BY \"t0\".\"id\" ASC"
        );
        // the limit counts instances, not rows
        assert_eq!(b.fragments().limit, None);
        let many: Vec<Instance> = (0..8).map(|_| Instance::new("Author", "id")).collect();
        assert_eq!(b.apply_window(many).len(), 5);
    }

    #[test]
    fn joined_key_path_filter_casts_qualified_column() {
        let pages = || KeyPath::new("metadata", [PathKey::from("pages")]);
        let request = QueryRequest::new()
            .filter(Predicate::gt(pages(), 300))
            .returning([PropertyRef::from("title"), pages().into()])
            .join("author", QueryRequest::new().returning(["name"]));
        let s = build(StatementKind::Select, "Book", &request).unwrap();
        assert_eq!(
            s.sql,
            "SELECT \"t0\".\"id\" AS \"t0_id\", \"t0\".\"title\" AS \"t0_title\", \
             \"t0\".\"metadata\"->'pages' AS \"t0_metadata->'pages'\", \
             \"t1\".\"id\" AS \"t1_id\", \"t1\".\"name\" AS \"t1_name\" \
             FROM \"books\" AS \"t0\" LEFT OUTER JOIN \"authors\" AS \"t1\" ON \"t1\".\"id\" = \"t0\".\"author_id\" \
             WHERE (\"t0\".\"metadata\"->'pages')::jsonb > :p1 ORDER BY \"t0\".\"id\" ASC"
        );
        let (positional, values) = s.to_positional().unwrap();
        assert!(positional.contains("(\"t0\".\"metadata\"->'pages')::jsonb > $1"));
        assert_eq!(values, vec![StorageValue::Json(json!(300))]);
    }

    #[test]
    fn raw_binding_cannot_shadow_generated_parameter() {
        let request = QueryRequest::new()
            .filter(Predicate::eq("name", "Herbert"))
            .join(
                "books",
                QueryRequest::new().raw_where(
                    RawWhere::new("\"t1\".\"title\" = :p1").bind("p1", StorageValue::String("Dune".into())),
                ),
            );
        let err = build(StatementKind::Select, "Author", &request).unwrap_err();
        assert!(matches!(err, QueryError::BadRequest(_)));

        let request = QueryRequest::new()
            .filter(Predicate::eq("name", "Herbert"))
            .join(
                "books",
                QueryRequest::new().raw_where(
                    RawWhere::new("\"t1\".\"title\" = :title").bind("title", StorageValue::String("Dune".into())),
                ),
            );
        let s = build(StatementKind::Select, "Author", &request).unwrap();
        assert!(s.sql.ends_with("WHERE (\"t0\".\"name\" = :p1) AND (\"t1\".\"title\" = :title) ORDER BY \"t0\".\"id\" ASC"));
        assert_eq!(s.params.get("p1"), Some(&StorageValue::String("Herbert".into())));
        assert_eq!(s.params.get("title"), Some(&StorageValue::String("Dune".into())));
    }

    #[test]
    fn limit_is_clamped() {
        let request = QueryRequest::new().returning(["title"]).limit(50_000).offset(10);
        let s = build(StatementKind::Select, "Book", &request).unwrap();
        assert!(s.sql.ends_with("LIMIT 1000 OFFSET 10"));
    }

    #[test]
    fn casts_placeholders_when_enabled() {
        let schema = test_schema();
        let request = QueryRequest::new().filter(Predicate::eq("id", 1)).returning(["title"]);
        let b = QueryBuilder::new(
            &schema,
            &QuerySettings::default(),
            "Book",
            StatementKind::Select,
            &request,
        )
        .unwrap();
        assert_eq!(
            b.statement().sql,
            "SELECT \"id\", \"title\" FROM \"books\" WHERE \"id\" = :p1::int8"
        );
    }

    #[test]
    fn writes_reject_joins() {
        let request = QueryRequest::new().set("name", "x").join("books", QueryRequest::new());
        assert!(matches!(
            build(StatementKind::Insert, "Author", &request),
            Err(QueryError::UnsupportedQueryShape(_))
        ));
    }
}
