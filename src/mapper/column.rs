//! Column mapper: physical column naming and value conversion for one property.

use crate::config::{AttributeDescriptor, PropertyKind, RelationshipDescriptor};
use crate::error::QueryError;
use crate::mapper::PathKey;
use crate::sql::{quoted, StorageValue};
use crate::value::{Document, Value};
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Options for `ColumnMapper::column_name`. Namespace and prefix are alternatives; namespace wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColumnNameOptions<'a> {
    pub with_type_suffix: bool,
    pub with_table_namespace: bool,
    pub prefix: Option<&'a str>,
}

impl<'a> ColumnNameOptions<'a> {
    pub fn namespaced() -> Self {
        ColumnNameOptions {
            with_table_namespace: true,
            ..Default::default()
        }
    }

    pub fn prefixed(prefix: &'a str) -> Self {
        ColumnNameOptions {
            prefix: Some(prefix),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
enum Target {
    Attribute(AttributeDescriptor),
    ForeignKey {
        relationship: RelationshipDescriptor,
        related_key: AttributeDescriptor,
    },
}

/// Maps one property (optionally a key-path inside it) to a column of `table`.
#[derive(Clone, Debug)]
pub struct ColumnMapper {
    table: String,
    target: Target,
    key_path: Vec<PathKey>,
    fetch_as_foreign_key: bool,
}

/// Physical foreign-key column for a belongs-to property.
pub fn foreign_key_column(property: &str, related_key: &str) -> String {
    format!("{}_{}", property, related_key)
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl ColumnMapper {
    pub fn attribute(table: impl Into<String>, attribute: AttributeDescriptor) -> Self {
        ColumnMapper {
            table: table.into(),
            target: Target::Attribute(attribute),
            key_path: Vec::new(),
            fetch_as_foreign_key: false,
        }
    }

    pub fn key_path(table: impl Into<String>, attribute: AttributeDescriptor, keys: Vec<PathKey>) -> Self {
        ColumnMapper {
            key_path: keys,
            ..ColumnMapper::attribute(table, attribute)
        }
    }

    /// Mapper that carries only the id of a belongs-to target, not the joined object.
    pub fn foreign_key(
        table: impl Into<String>,
        relationship: RelationshipDescriptor,
        related_key: AttributeDescriptor,
    ) -> Self {
        ColumnMapper {
            table: table.into(),
            target: Target::ForeignKey {
                relationship,
                related_key,
            },
            key_path: Vec::new(),
            fetch_as_foreign_key: true,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn property_name(&self) -> &str {
        match &self.target {
            Target::Attribute(a) => &a.name,
            Target::ForeignKey { relationship, .. } => &relationship.name,
        }
    }

    pub fn key_path_keys(&self) -> &[PathKey] {
        &self.key_path
    }

    pub fn fetch_as_foreign_key(&self) -> bool {
        self.fetch_as_foreign_key
    }

    /// Kind of the stored column. Key-path elements are always jsonb.
    pub fn kind(&self) -> PropertyKind {
        match &self.target {
            _ if !self.key_path.is_empty() => PropertyKind::Json,
            Target::Attribute(a) => a.kind,
            Target::ForeignKey { related_key, .. } => related_key.kind,
        }
    }

    pub fn type_suffix(&self) -> String {
        self.kind().type_suffix()
    }

    /// Unquoted base name: `author_id`, `metadata->'tags'->0` or `title`.
    pub fn raw_name(&self) -> String {
        if self.fetch_as_foreign_key {
            if let Target::ForeignKey {
                relationship,
                related_key,
            } = &self.target
            {
                return foreign_key_column(&relationship.name, &related_key.name);
            }
        }
        let mut name = self.property_name().to_string();
        for key in &self.key_path {
            name.push_str("->");
            match key {
                PathKey::Name(s) => name.push_str(&sql_string(s)),
                PathKey::Index(i) => name.push_str(&i.to_string()),
            }
        }
        name
    }

    fn base_name(&self) -> String {
        let raw = self.raw_name();
        match raw.split_once("->") {
            Some((column, path)) => format!("{}->{}", quoted(column), path),
            None => quoted(&raw),
        }
    }

    /// Rendered column reference. Table qualification (or, failing that, the alias prefix)
    /// is applied to the base name before the type suffix, so a cast covers the whole path.
    pub fn column_name(&self, options: ColumnNameOptions<'_>) -> String {
        let suffix = if options.with_type_suffix {
            self.type_suffix()
        } else {
            String::new()
        };
        if options.with_table_namespace {
            let qualified = format!("{}.{}", quoted(&self.table), self.base_name());
            return self.suffixed(qualified, &suffix);
        }
        if let Some(prefix) = options.prefix {
            return format!("{}{}", quoted(&self.output_key(prefix)), suffix);
        }
        self.suffixed(self.base_name(), &suffix)
    }

    fn suffixed(&self, base: String, suffix: &str) -> String {
        if suffix.is_empty() {
            base
        } else if self.key_path.is_empty() {
            format!("{}{}", base, suffix)
        } else {
            format!("({}){}", base, suffix)
        }
    }

    /// Result-row key for this column under `prefix`.
    pub fn output_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.raw_name())
    }

    /// Key the decoded value is stored under on an instance.
    pub fn value_key(&self) -> String {
        if self.key_path.is_empty() {
            self.property_name().to_string()
        } else {
            self.raw_name()
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> QueryError {
        QueryError::InvalidStorageValue {
            property: self.property_name().to_string(),
            reason: reason.into(),
        }
    }

    pub fn convert_value_for_storage(&self, value: &Value) -> Result<StorageValue, QueryError> {
        if !self.key_path.is_empty() {
            return Ok(match value {
                Value::Null => StorageValue::Null,
                Value::Document(d) => StorageValue::Json(d.data().clone()),
                other => StorageValue::Json(other.to_json()),
            });
        }
        match &self.target {
            Target::Attribute(a) => attribute_to_storage(a, value).map_err(|r| self.invalid(r)),
            Target::ForeignKey { related_key, .. } => {
                attribute_to_storage(related_key, value).map_err(|r| self.invalid(r))
            }
        }
    }

    pub fn convert_value_from_storage(&self, value: &StorageValue) -> Result<Value, QueryError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if !self.key_path.is_empty() {
            return Ok(Value::Document(Document::new(value.to_json())));
        }
        match &self.target {
            Target::Attribute(a) => attribute_from_storage(a, value).map_err(|r| self.invalid(r)),
            Target::ForeignKey { related_key, .. } => {
                attribute_from_storage(related_key, value).map_err(|r| self.invalid(r))
            }
        }
    }
}

fn attribute_to_storage(a: &AttributeDescriptor, value: &Value) -> Result<StorageValue, String> {
    if let Some(en) = &a.enumeration {
        return match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Enum(name) => en
                .raw_for(name)
                .cloned()
                .ok_or_else(|| format!("{} is not a variant of {}", name, en.name)),
            other => Err(format!("expected a {} variant, got {}", en.name, other.type_name())),
        };
    }
    if a.is_document() {
        return match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Document(d) => Ok(StorageValue::Json(d.data().clone())),
            Value::Map(m) => Ok(StorageValue::Json(JsonValue::Object(m.clone()))),
            Value::List(l) => Ok(StorageValue::Json(JsonValue::Array(l.clone()))),
            other => Err(format!(
                "json attribute takes a document, map or list, got {}",
                other.type_name()
            )),
        };
    }
    Ok(match value {
        Value::Null => StorageValue::Null,
        Value::Bool(b) => StorageValue::Bool(*b),
        Value::Int(n) => StorageValue::I64(*n),
        Value::Double(n) => StorageValue::F64(*n),
        Value::Text(s) => match a.kind {
            PropertyKind::Uuid => StorageValue::Uuid(
                uuid::Uuid::parse_str(s).map_err(|e| format!("{:?} is not a uuid: {}", s, e))?,
            ),
            PropertyKind::Timestamp => StorageValue::Timestamp(
                NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .map_err(|e| format!("{:?} is not a timestamp: {}", s, e))?,
            ),
            _ => StorageValue::String(s.clone()),
        },
        Value::Enum(s) => StorageValue::String(s.clone()),
        Value::Timestamp(t) => StorageValue::Timestamp(*t),
        Value::Uuid(u) => StorageValue::Uuid(*u),
        Value::Document(d) => StorageValue::Json(d.data().clone()),
        Value::Map(m) => StorageValue::Json(JsonValue::Object(m.clone())),
        Value::List(l) => StorageValue::Json(JsonValue::Array(l.clone())),
    })
}

fn attribute_from_storage(a: &AttributeDescriptor, value: &StorageValue) -> Result<Value, String> {
    if let Some(en) = &a.enumeration {
        return en
            .variant_for(value)
            .map(|v| Value::Enum(v.to_string()))
            .ok_or_else(|| format!("stored value {:?} is not a variant of {}", value, en.name));
    }
    if a.is_document() {
        return Ok(Value::Document(Document::new(value.to_json())));
    }
    Ok(match value {
        StorageValue::Null => Value::Null,
        StorageValue::Bool(b) => Value::Bool(*b),
        StorageValue::I64(n) => Value::Int(*n),
        StorageValue::F64(n) => Value::Double(*n),
        StorageValue::String(s) => match a.kind {
            PropertyKind::Timestamp => NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                .map(Value::Timestamp)
                .map_err(|e| format!("stored {:?} is not a timestamp: {}", s, e))?,
            PropertyKind::Uuid => uuid::Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| format!("stored {:?} is not a uuid: {}", s, e))?,
            _ => Value::Text(s.clone()),
        },
        StorageValue::Uuid(u) => Value::Uuid(*u),
        StorageValue::Timestamp(t) => Value::Timestamp(*t),
        StorageValue::Json(JsonValue::Object(m)) => Value::Map(m.clone()),
        StorageValue::Json(JsonValue::Array(l)) => Value::List(l.clone()),
        StorageValue::Json(other) => attribute_from_storage(a, &StorageValue::from_json(other))?,
    })
}
