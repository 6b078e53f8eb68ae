//! Load the schema document from memory or disk and resolve it into a `Schema`.

use crate::config::resolved::{
    AttributeDescriptor, EntityDescriptor, EnumDescriptor, EnumVariant, PropertyDescriptor,
    PropertyKind, RelationshipDescriptor, Schema,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::sql::StorageValue;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build the resolved schema from config (validates first).
pub fn resolve(config: &SchemaConfig) -> Result<Schema, ConfigError> {
    validate(config)?;

    let enums: HashMap<&str, Arc<EnumDescriptor>> = config
        .enums
        .iter()
        .map(|e| resolve_enum(e).map(|d| (e.name.as_str(), Arc::new(d))))
        .collect::<Result<_, ConfigError>>()?;

    let mut entities = Vec::with_capacity(config.entities.len());
    for ent in &config.entities {
        let mut properties = Vec::with_capacity(ent.properties.len());
        for p in &ent.properties {
            let resolved = match p {
                PropertyConfig::Attribute(a) => {
                    let kind: PropertyKind = a.type_.parse().map_err(ConfigError::Validation)?;
                    let enumeration = match &a.enum_ {
                        Some(name) => Some(enums.get(name.as_str()).cloned().ok_or_else(|| {
                            ConfigError::MissingReference {
                                kind: "enum",
                                id: name.clone(),
                            }
                        })?),
                        None => None,
                    };
                    PropertyDescriptor::Attribute(AttributeDescriptor {
                        name: a.name.clone(),
                        kind,
                        enumeration,
                        nullable: a.nullable,
                        has_default: a.has_default,
                    })
                }
                PropertyConfig::Relationship(r) => PropertyDescriptor::Relationship(RelationshipDescriptor {
                    name: r.name.clone(),
                    kind: r.relationship,
                    target: r.target.clone(),
                    inverse: r.inverse.clone(),
                }),
            };
            properties.push(resolved);
        }
        entities.push(EntityDescriptor::new(
            ent.name.clone(),
            ent.table.clone(),
            ent.primary_key.clone(),
            properties,
        )?);
    }

    tracing::debug!(entities = entities.len(), enums = enums.len(), "schema resolved");
    Ok(Schema::new(entities))
}

fn resolve_enum(e: &EnumConfig) -> Result<EnumDescriptor, ConfigError> {
    let variants = e
        .values
        .iter()
        .map(|v| {
            let raw = match &v.raw {
                serde_json::Value::String(s) => StorageValue::String(s.clone()),
                serde_json::Value::Number(n) => n.as_i64().map(StorageValue::I64).ok_or_else(|| {
                    ConfigError::Validation(format!("enum {} value {} must be an integer", e.name, v.name))
                })?,
                other => {
                    return Err(ConfigError::Validation(format!(
                        "enum {} value {} must be a string or integer, got {}",
                        e.name, v.name, other
                    )))
                }
            };
            Ok(EnumVariant {
                name: v.name.clone(),
                raw,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EnumDescriptor {
        name: e.name.clone(),
        variants,
    })
}

/// Parse and resolve a schema document from JSON text.
pub fn resolve_json(text: &str) -> Result<Schema, ConfigError> {
    let config: SchemaConfig =
        serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
    resolve(&config)
}

/// Read a schema document from disk.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Schema, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    resolve_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationshipKind;
    use serde_json::json;

    #[test]
    fn resolves_library_schema() {
        let text = json!({
            "enums": [{ "name": "Status", "values": [
                { "name": "Draft", "raw": "draft" },
                { "name": "Published", "raw": "published" }
            ] }],
            "entities": [
                { "name": "Author", "table": "authors", "primary_key": "id",
                  "properties": [
                    { "name": "id", "type": "bigint", "has_default": true },
                    { "name": "name", "type": "text" },
                    { "name": "books", "relationship": "has_many", "target": "Book", "inverse": "author" }
                  ] },
                { "name": "Book", "table": "books", "primary_key": "id",
                  "properties": [
                    { "name": "id", "type": "bigint" },
                    { "name": "status", "type": "text", "enum": "Status" },
                    { "name": "author", "relationship": "belongs_to", "target": "Author" }
                  ] }
            ]
        })
        .to_string();
        let schema = resolve_json(&text).unwrap();
        assert_eq!(schema.len(), 2);
        let book = schema.get("Book").unwrap();
        assert_eq!(book.table_name, "books");
        assert_eq!(book.attributes().count(), 2);
        let status = book.property("status").unwrap().as_attribute().unwrap();
        let en = status.enumeration.as_ref().unwrap();
        assert_eq!(en.raw_for("Published"), Some(&StorageValue::String("published".into())));
        let author = book.property("author").unwrap().as_relationship().unwrap();
        assert_eq!(author.kind, RelationshipKind::BelongsTo);
        assert!(schema.get("Author").unwrap().primary_key_property().has_default);
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        assert!(matches!(resolve_json("{"), Err(ConfigError::Load(_))));
    }
}
