//! Resolve property references against entity descriptors into column mappers.

use crate::config::{EntityDescriptor, PropertyDescriptor, Schema};
use crate::error::QueryError;
use crate::mapper::ColumnMapper;

/// One step into a JSON document: object key or array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathKey {
    Name(String),
    Index(i64),
}

impl From<&str> for PathKey {
    fn from(s: &str) -> Self {
        PathKey::Name(s.to_string())
    }
}

impl From<i64> for PathKey {
    fn from(n: i64) -> Self {
        PathKey::Index(n)
    }
}

/// Address of a nested element inside a JSON attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath {
    pub property: String,
    pub keys: Vec<PathKey>,
}

impl KeyPath {
    pub fn new(property: impl Into<String>, keys: impl IntoIterator<Item = PathKey>) -> Self {
        KeyPath {
            property: property.into(),
            keys: keys.into_iter().collect(),
        }
    }
}

/// A requested property: plain name or key-path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyRef {
    Name(String),
    KeyPath(KeyPath),
}

impl PropertyRef {
    pub fn property(&self) -> &str {
        match self {
            PropertyRef::Name(n) => n,
            PropertyRef::KeyPath(k) => &k.property,
        }
    }
}

impl From<&str> for PropertyRef {
    fn from(s: &str) -> Self {
        PropertyRef::Name(s.to_string())
    }
}

impl From<String> for PropertyRef {
    fn from(s: String) -> Self {
        PropertyRef::Name(s)
    }
}

impl From<KeyPath> for PropertyRef {
    fn from(k: KeyPath) -> Self {
        PropertyRef::KeyPath(k)
    }
}

/// Look up a column-backed property. To-many and has-one relationships need a join instead.
pub fn resolve<'e>(entity: &'e EntityDescriptor, name: &str) -> Result<&'e PropertyDescriptor, QueryError> {
    let property = entity.property(name).ok_or_else(|| QueryError::UnknownColumn {
        entity: entity.name.clone(),
        property: name.to_string(),
    })?;
    if let PropertyDescriptor::Relationship(r) = property {
        if !r.is_belongs_to() {
            return Err(QueryError::InvalidColumnReference {
                entity: entity.name.clone(),
                property: name.to_string(),
                reason: format!(
                    "{:?} relationship to {} has no column; request it as a join sub-query",
                    r.kind, r.target
                ),
            });
        }
    }
    Ok(property)
}

/// Build the column mapper for one reference, bound to `table` (table name or join alias).
pub fn column_mapper(
    schema: &Schema,
    table: &str,
    entity: &EntityDescriptor,
    reference: &PropertyRef,
) -> Result<ColumnMapper, QueryError> {
    let property = resolve(entity, reference.property())?;
    match (property, reference) {
        (PropertyDescriptor::Attribute(a), PropertyRef::Name(_)) => Ok(ColumnMapper::attribute(table, a.clone())),
        (PropertyDescriptor::Attribute(a), PropertyRef::KeyPath(k)) => {
            if !a.is_document() {
                return Err(QueryError::InvalidColumnReference {
                    entity: entity.name.clone(),
                    property: a.name.clone(),
                    reason: "key-paths are only valid on json attributes".into(),
                });
            }
            Ok(ColumnMapper::key_path(table, a.clone(), k.keys.clone()))
        }
        (PropertyDescriptor::Relationship(r), PropertyRef::Name(_)) => {
            let target = schema.entity(&r.target)?;
            Ok(ColumnMapper::foreign_key(
                table,
                r.clone(),
                target.primary_key_property().clone(),
            ))
        }
        (PropertyDescriptor::Relationship(r), PropertyRef::KeyPath(_)) => Err(QueryError::InvalidColumnReference {
            entity: entity.name.clone(),
            property: r.name.clone(),
            reason: "key-paths are only valid on json attributes".into(),
        }),
    }
}

/// Column mappers for `keys`, primary key first and never repeated.
/// An empty key list selects the primary key plus every scalar attribute.
pub fn from_keys(
    schema: &Schema,
    table: &str,
    entity: &EntityDescriptor,
    keys: &[PropertyRef],
) -> Result<Vec<ColumnMapper>, QueryError> {
    let pk = entity.primary_key_property();
    let mut mappers = vec![ColumnMapper::attribute(table, pk.clone())];
    let mut seen: Vec<&PropertyRef> = Vec::with_capacity(keys.len());

    if keys.is_empty() {
        for a in entity.attributes().filter(|a| a.name != pk.name) {
            mappers.push(ColumnMapper::attribute(table, a.clone()));
        }
        return Ok(mappers);
    }

    for key in keys {
        if matches!(key, PropertyRef::Name(n) if *n == pk.name) || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        mappers.push(column_mapper(schema, table, entity, key)?);
    }
    Ok(mappers)
}
