//! Row mapper: the join tree of one statement, stored as an arena.
//!
//! Node 0 is the root table. Every other node is a LEFT OUTER JOIN over one
//! relationship of its parent, created in breadth-first order so a parent's
//! alias is always introduced before its children reference it. The tree
//! renders the SELECT list, the FROM/JOIN text and the per-level WHERE parts,
//! and folds flat result rows back into nested `Instance`s.

use crate::config::{EntityDescriptor, RelationshipDescriptor, Schema};
use crate::error::QueryError;
use crate::instance::{Instance, Related};
use crate::mapper::{foreign_key_column, from_keys, ColumnMapper, ColumnNameOptions, PropertyRef};
use crate::sql::{quoted, Filter, Join, Params, StorageValue, Translator};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// One flat result row: output column key → stored value.
pub type Row = BTreeMap<String, StorageValue>;

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    LeftOuter,
}

impl JoinType {
    pub const fn keyword(self) -> &'static str {
        match self {
            JoinType::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

#[derive(Clone, Debug)]
pub struct JoinNode {
    pub entity: Arc<EntityDescriptor>,
    /// Relationship on the parent this node was reached through; `None` for the root.
    pub relationship: Option<RelationshipDescriptor>,
    pub join_type: JoinType,
    /// Table name, or the alias when the statement joins.
    pub table_ref: String,
    /// Output-key prefix for this level's columns ("" without joins).
    pub prefix: String,
    /// Projection, primary key first.
    pub columns: Vec<ColumnMapper>,
    pub filter: Option<Filter>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl JoinNode {
    fn primary_key(&self) -> &ColumnMapper {
        &self.columns[0]
    }
}

#[derive(Clone, Debug)]
pub struct RowMapper {
    nodes: Vec<JoinNode>,
}

impl RowMapper {
    /// Root-only mapper for the given projection keys (write statements and plain selects).
    pub fn root(
        schema: &Schema,
        entity: &Arc<EntityDescriptor>,
        keys: &[PropertyRef],
    ) -> Result<Self, QueryError> {
        Self::build(schema, entity, keys, &[])
    }

    /// Build the tree for `joins`, visiting sub-queries breadth-first.
    pub fn build(
        schema: &Schema,
        entity: &Arc<EntityDescriptor>,
        keys: &[PropertyRef],
        joins: &[Join],
    ) -> Result<Self, QueryError> {
        let joined = !joins.is_empty();
        let alias = |n: usize| format!("t{}", n);
        let root_ref = if joined { alias(0) } else { entity.table_name.clone() };
        let root = JoinNode {
            entity: Arc::clone(entity),
            relationship: None,
            join_type: JoinType::LeftOuter,
            columns: from_keys(schema, &root_ref, entity, keys)?,
            prefix: if joined { format!("{}_", root_ref) } else { String::new() },
            table_ref: root_ref,
            filter: None,
            parent: None,
            children: Vec::new(),
        };
        let mut nodes = vec![root];

        let mut queue: VecDeque<(NodeId, &Join)> = joins.iter().map(|j| (0, j)).collect();
        while let Some((parent_id, join)) = queue.pop_front() {
            let parent_entity = Arc::clone(&nodes[parent_id].entity);
            let relationship = parent_entity
                .property(&join.property)
                .ok_or_else(|| QueryError::UnknownColumn {
                    entity: parent_entity.name.clone(),
                    property: join.property.clone(),
                })?
                .as_relationship()
                .cloned()
                .ok_or_else(|| QueryError::InvalidColumnReference {
                    entity: parent_entity.name.clone(),
                    property: join.property.clone(),
                    reason: "only relationships can be joined".into(),
                })?;
            let target = Arc::clone(schema.entity(&relationship.target)?);
            let id = nodes.len();
            let table_ref = alias(id);
            let node = JoinNode {
                columns: from_keys(schema, &table_ref, &target, &join.request.returning)?,
                entity: target,
                relationship: Some(relationship),
                join_type: JoinType::LeftOuter,
                prefix: format!("{}_", table_ref),
                table_ref,
                filter: join.request.filter.clone(),
                parent: Some(parent_id),
                children: Vec::new(),
            };
            nodes.push(node);
            nodes[parent_id].children.push(id);
            queue.extend(join.request.joins.iter().map(|j| (id, j)));
        }
        Ok(RowMapper { nodes })
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn root_node(&self) -> &JoinNode {
        &self.nodes[0]
    }

    pub fn is_joined(&self) -> bool {
        self.nodes.len() > 1
    }

    /// SELECT list across the whole tree, aliased per level when joined.
    pub fn select_list(&self) -> Vec<String> {
        if !self.is_joined() {
            return self.nodes[0]
                .columns
                .iter()
                .map(|c| {
                    let column = c.column_name(ColumnNameOptions::default());
                    if c.key_path_keys().is_empty() {
                        column
                    } else {
                        // expressions need an alias to come back under a known key
                        format!("{} AS {}", column, c.column_name(ColumnNameOptions::prefixed("")))
                    }
                })
                .collect();
        }
        self.nodes
            .iter()
            .flat_map(|node| {
                node.columns.iter().map(move |c| {
                    format!(
                        "{} AS {}",
                        c.column_name(ColumnNameOptions::namespaced()),
                        c.column_name(ColumnNameOptions::prefixed(&node.prefix))
                    )
                })
            })
            .collect()
    }

    /// FROM target including one JOIN clause per child node.
    pub fn from_clause(&self) -> String {
        let root = &self.nodes[0];
        if !self.is_joined() {
            return quoted(&root.entity.table_name);
        }
        let mut out = format!("{} AS {}", quoted(&root.entity.table_name), quoted(&root.table_ref));
        for node in &self.nodes[1..] {
            let (Some(parent_id), Some(rel)) = (node.parent, node.relationship.as_ref()) else {
                continue;
            };
            let parent = &self.nodes[parent_id];
            let on = if rel.is_belongs_to() {
                format!(
                    "{}.{} = {}.{}",
                    quoted(&node.table_ref),
                    quoted(&node.entity.primary_key),
                    quoted(&parent.table_ref),
                    quoted(&foreign_key_column(&rel.name, &node.entity.primary_key))
                )
            } else {
                let inverse = rel.inverse.as_deref().unwrap_or_default();
                format!(
                    "{}.{} = {}.{}",
                    quoted(&node.table_ref),
                    quoted(&foreign_key_column(inverse, &parent.entity.primary_key)),
                    quoted(&parent.table_ref),
                    quoted(&parent.entity.primary_key)
                )
            };
            out.push_str(&format!(
                " {} {} AS {} ON {}",
                node.join_type.keyword(),
                quoted(&node.entity.table_name),
                quoted(&node.table_ref),
                on
            ));
        }
        out
    }

    /// WHERE parts contributed by joined levels, in tree order.
    pub fn join_where_parts(
        &self,
        schema: &Schema,
        cast_parameters: bool,
        params: &mut Params,
    ) -> Result<Vec<String>, QueryError> {
        let mut parts = Vec::new();
        for node in &self.nodes[1..] {
            let Some(filter) = &node.filter else { continue };
            let t = Translator {
                schema,
                entity: &node.entity,
                table: &node.table_ref,
                namespaced: true,
                cast_parameters,
            };
            parts.push(t.translate(filter, params)?);
        }
        Ok(parts)
    }

    /// Fold rows into root instances. Rows of one root identity must be contiguous.
    pub fn decode(&self, rows: &[Row]) -> Result<Vec<Instance>, QueryError> {
        let root = &self.nodes[0];
        let pk_key = root.primary_key().output_key(&root.prefix);
        let mut out = Vec::new();
        let mut group: Vec<&Row> = Vec::new();
        let mut current: Option<String> = None;
        for row in rows {
            let Some(key) = row.get(&pk_key).and_then(StorageValue::identity_key) else {
                continue;
            };
            if current.as_ref() != Some(&key) {
                if !group.is_empty() {
                    out.push(self.decode_node(0, &group)?);
                    group.clear();
                }
                current = Some(key);
            }
            group.push(row);
        }
        if !group.is_empty() {
            out.push(self.decode_node(0, &group)?);
        }
        Ok(out)
    }

    fn decode_node(&self, id: NodeId, rows: &[&Row]) -> Result<Instance, QueryError> {
        let node = &self.nodes[id];
        let first = rows[0];
        let mut instance = Instance::new(node.entity.name.clone(), node.entity.primary_key.clone());
        for column in &node.columns {
            let stored = first
                .get(&column.output_key(&node.prefix))
                .unwrap_or(&StorageValue::Null);
            instance
                .values
                .insert(column.value_key(), column.convert_value_from_storage(stored)?);
        }

        for &child_id in &node.children {
            let child = &self.nodes[child_id];
            let child_pk = child.primary_key().output_key(&child.prefix);
            let mut order: Vec<Vec<&Row>> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            for row in rows {
                // Outer-join misses carry a NULL child key and produce no child.
                let Some(key) = row.get(&child_pk).and_then(StorageValue::identity_key) else {
                    continue;
                };
                match index.get(&key) {
                    Some(&i) => order[i].push(row),
                    None => {
                        index.insert(key, order.len());
                        order.push(vec![row]);
                    }
                }
            }
            let children = order
                .iter()
                .map(|group| self.decode_node(child_id, group))
                .collect::<Result<Vec<_>, _>>()?;
            let Some(rel) = &child.relationship else { continue };
            let related = if rel.is_to_many() {
                Related::Many(children)
            } else {
                Related::One(children.into_iter().next().map(Box::new))
            };
            instance.related.insert(rel.name.clone(), related);
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{test_schema, KeyPath, PathKey};
    use crate::sql::{Predicate, QueryRequest};
    use crate::value::Value;

    fn row(pairs: &[(&str, StorageValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn author_books(schema: &Schema) -> RowMapper {
        let author = schema.get("Author").unwrap();
        let joins = vec![Join {
            property: "books".into(),
            request: QueryRequest::new().returning(["title"]),
        }];
        RowMapper::build(schema, author, &["name".into()], &joins).unwrap()
    }

    #[test]
    fn renders_select_and_join() {
        let schema = test_schema();
        let mapper = author_books(&schema);
        assert_eq!(
            mapper.select_list(),
            vec![
                "\"t0\".\"id\" AS \"t0_id\"",
                "\"t0\".\"name\" AS \"t0_name\"",
                "\"t1\".\"id\" AS \"t1_id\"",
                "\"t1\".\"title\" AS \"t1_title\"",
            ]
        );
        assert_eq!(
            mapper.from_clause(),
            "\"authors\" AS \"t0\" LEFT OUTER JOIN \"books\" AS \"t1\" ON \"t1\".\"author_id\" = \"t0\".\"id\""
        );
    }

    #[test]
    fn belongs_to_join_uses_parent_foreign_key() {
        let schema = test_schema();
        let book = schema.get("Book").unwrap();
        let joins = vec![Join {
            property: "author".into(),
            request: QueryRequest::new(),
        }];
        let mapper = RowMapper::build(&schema, book, &[], &joins).unwrap();
        assert!(mapper.from_clause().ends_with(
            "LEFT OUTER JOIN \"authors\" AS \"t1\" ON \"t1\".\"id\" = \"t0\".\"author_id\""
        ));
    }

    #[test]
    fn nested_joins_are_breadth_first() {
        let schema = test_schema();
        let author = schema.get("Author").unwrap();
        let joins = vec![Join {
            property: "books".into(),
            request: QueryRequest::new().join("reviews", QueryRequest::new()),
        }];
        let mapper = RowMapper::build(&schema, author, &[], &joins).unwrap();
        assert_eq!(mapper.nodes().len(), 3);
        assert_eq!(mapper.nodes()[2].parent, Some(1));
        assert_eq!(mapper.nodes()[1].children, vec![2]);
        assert!(mapper
            .from_clause()
            .ends_with("\"reviews\" AS \"t2\" ON \"t2\".\"book_id\" = \"t1\".\"id\""));
    }

    #[test]
    fn joining_an_attribute_fails() {
        let schema = test_schema();
        let author = schema.get("Author").unwrap();
        let joins = vec![Join {
            property: "name".into(),
            request: QueryRequest::new(),
        }];
        assert!(matches!(
            RowMapper::build(&schema, author, &[], &joins),
            Err(QueryError::InvalidColumnReference { .. })
        ));
    }

    #[test]
    fn join_filters_follow_tree_order() {
        let schema = test_schema();
        let author = schema.get("Author").unwrap();
        let joins = vec![Join {
            property: "books".into(),
            request: QueryRequest::new()
                .filter(Predicate::eq("title", "Dune"))
                .join("reviews", QueryRequest::new().filter(Predicate::gt("rating", 3))),
        }];
        let mapper = RowMapper::build(&schema, author, &[], &joins).unwrap();
        let mut params = Params::new();
        let parts = mapper.join_where_parts(&schema, false, &mut params).unwrap();
        assert_eq!(
            parts,
            vec!["\"t1\".\"title\" = :p1", "\"t2\".\"rating\" > :p2"]
        );
    }

    #[test]
    fn decodes_groups_and_skips_null_children() {
        let schema = test_schema();
        let mapper = author_books(&schema);
        let rows = vec![
            row(&[
                ("t0_id", StorageValue::I64(1)),
                ("t0_name", StorageValue::String("Herbert".into())),
                ("t1_id", StorageValue::I64(10)),
                ("t1_title", StorageValue::String("Dune".into())),
            ]),
            row(&[
                ("t0_id", StorageValue::I64(1)),
                ("t0_name", StorageValue::String("Herbert".into())),
                ("t1_id", StorageValue::I64(11)),
                ("t1_title", StorageValue::String("Dune Messiah".into())),
            ]),
            row(&[
                ("t0_id", StorageValue::I64(2)),
                ("t0_name", StorageValue::String("Nobody".into())),
                ("t1_id", StorageValue::Null),
                ("t1_title", StorageValue::Null),
            ]),
        ];
        let out = mapper.decode(&rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].many("books").len(), 2);
        assert_eq!(out[0].many("books")[1].get("title"), &Value::Text("Dune Messiah".into()));
        assert_eq!(out[1].get("name"), &Value::Text("Nobody".into()));
        assert!(matches!(out[1].related.get("books"), Some(Related::Many(v)) if v.is_empty()));
    }

    #[test]
    fn repeated_child_rows_collapse() {
        let schema = test_schema();
        let author = schema.get("Author").unwrap();
        let joins = vec![Join {
            property: "books".into(),
            request: QueryRequest::new().join("reviews", QueryRequest::new().returning(["rating"])),
        }];
        let mapper = RowMapper::build(&schema, author, &[], &joins).unwrap();
        let r1 = uuid::Uuid::new_v4();
        let r2 = uuid::Uuid::new_v4();
        let base = |review: Option<uuid::Uuid>, rating: i64| {
            let mut r = row(&[
                ("t0_id", StorageValue::I64(1)),
                ("t1_id", StorageValue::I64(10)),
                ("t2_rating", StorageValue::I64(rating)),
            ]);
            r.insert(
                "t2_id".into(),
                review.map(StorageValue::Uuid).unwrap_or(StorageValue::Null),
            );
            r
        };
        let rows = vec![base(Some(r1), 5), base(Some(r2), 4)];
        let out = mapper.decode(&rows).unwrap();
        assert_eq!(out.len(), 1);
        let books = out[0].many("books");
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].many("reviews").len(), 2);
        assert_eq!(books[0].many("reviews")[0].id(), &Value::Uuid(r1));
    }

    fn books_with_author(schema: &Schema, keys: &[PropertyRef]) -> RowMapper {
        let book = schema.get("Book").unwrap();
        let joins = vec![Join {
            property: "author".into(),
            request: QueryRequest::new().returning(["name"]),
        }];
        RowMapper::build(schema, book, keys, &joins).unwrap()
    }

    #[test]
    fn belongs_to_decodes_one_or_none() {
        let schema = test_schema();
        let mapper = books_with_author(&schema, &["title".into()]);
        let rows = vec![
            row(&[
                ("t0_id", StorageValue::I64(10)),
                ("t0_title", StorageValue::String("Dune".into())),
                ("t1_id", StorageValue::I64(1)),
                ("t1_name", StorageValue::String("Herbert".into())),
            ]),
            row(&[
                ("t0_id", StorageValue::I64(11)),
                ("t0_title", StorageValue::String("Anonymous Pamphlet".into())),
                ("t1_id", StorageValue::Null),
                ("t1_name", StorageValue::Null),
            ]),
        ];
        let out = mapper.decode(&rows).unwrap();
        assert_eq!(out.len(), 2);
        let author = out[0].one("author").expect("joined author");
        assert_eq!(author.id(), &Value::Int(1));
        assert_eq!(author.get("name"), &Value::Text("Herbert".into()));
        assert!(matches!(out[0].related.get("author"), Some(Related::One(Some(_)))));
        assert!(matches!(out[1].related.get("author"), Some(Related::One(None))));
        assert!(out[1].one("author").is_none());
        assert_eq!(
            out[1].to_json(),
            serde_json::json!({"id": 11, "title": "Anonymous Pamphlet", "author": null})
        );
    }

    #[test]
    fn joined_key_path_is_qualified_and_decoded() {
        let schema = test_schema();
        let pages: PropertyRef = KeyPath::new("metadata", [PathKey::from("pages")]).into();
        let mapper = books_with_author(&schema, &[pages]);
        assert_eq!(
            mapper.select_list()[1],
            "\"t0\".\"metadata\"->'pages' AS \"t0_metadata->'pages'\""
        );
        let rows = vec![row(&[
            ("t0_id", StorageValue::I64(10)),
            ("t0_metadata->'pages'", StorageValue::Json(serde_json::json!(412))),
            ("t1_id", StorageValue::I64(1)),
            ("t1_name", StorageValue::String("Herbert".into())),
        ])];
        let out = mapper.decode(&rows).unwrap();
        assert_eq!(
            out[0].get("metadata->'pages'"),
            &Value::Document(crate::value::Document::new(serde_json::json!(412)))
        );
        assert!(out[0].one("author").is_some());
    }

    #[test]
    fn unjoined_mapper_uses_plain_names() {
        let schema = test_schema();
        let book = schema.get("Book").unwrap();
        let mapper = RowMapper::root(&schema, book, &["title".into()]).unwrap();
        assert_eq!(mapper.select_list(), vec!["\"id\"", "\"title\""]);
        assert_eq!(mapper.from_clause(), "\"books\"");
        let rows = vec![row(&[
            ("id", StorageValue::I64(3)),
            ("title", StorageValue::String("Emma".into())),
        ])];
        let out = mapper.decode(&rows).unwrap();
        assert_eq!(out[0].id(), &Value::Int(3));
    }
}
