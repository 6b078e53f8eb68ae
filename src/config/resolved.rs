//! Resolved schema: config validated and flattened into immutable entity descriptors.

use crate::config::RelationshipKind;
use crate::error::{ConfigError, QueryError};
use crate::sql::StorageValue;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Scalar kind of an attribute column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Integer,
    BigInt,
    Text,
    Timestamp,
    Boolean,
    Double,
    Json,
    Uuid,
}

impl PropertyKind {
    /// PostgreSQL type used for explicit casts. `None` when the driver binds the type natively.
    pub const fn wire_type(self) -> Option<&'static str> {
        match self {
            PropertyKind::Integer => Some("int4"),
            PropertyKind::BigInt => Some("int8"),
            PropertyKind::Text => Some("text"),
            PropertyKind::Timestamp => Some("timestamp"),
            PropertyKind::Boolean => Some("bool"),
            PropertyKind::Double => Some("float8"),
            PropertyKind::Json => Some("jsonb"),
            PropertyKind::Uuid => None,
        }
    }

    /// Cast suffix appended to columns and placeholders ("" when no hint is needed).
    pub fn type_suffix(self) -> String {
        self.wire_type().map(|t| format!("::{}", t)).unwrap_or_default()
    }
}

impl std::str::FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "int4" => Ok(PropertyKind::Integer),
            "bigint" | "int8" => Ok(PropertyKind::BigInt),
            "text" | "string" => Ok(PropertyKind::Text),
            "timestamp" => Ok(PropertyKind::Timestamp),
            "boolean" | "bool" => Ok(PropertyKind::Boolean),
            "double" | "float8" => Ok(PropertyKind::Double),
            "json" | "jsonb" | "document" => Ok(PropertyKind::Json),
            "uuid" => Ok(PropertyKind::Uuid),
            _ => Err(format!("unknown property type: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub raw: StorageValue,
}

/// Enumerated attribute: exposed as variant names, stored as the underlying primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

impl EnumDescriptor {
    pub fn raw_for(&self, variant: &str) -> Option<&StorageValue> {
        self.variants.iter().find(|v| v.name == variant).map(|v| &v.raw)
    }

    pub fn variant_for(&self, raw: &StorageValue) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.raw == *raw)
            .map(|v| v.name.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub enumeration: Option<Arc<EnumDescriptor>>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. a serial key or NOW()).
    pub has_default: bool,
}

impl AttributeDescriptor {
    pub fn is_document(&self) -> bool {
        self.kind == PropertyKind::Json
    }

    /// Whether `value` can be assigned to this attribute.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable;
        }
        if let Some(en) = &self.enumeration {
            return matches!(value, Value::Enum(name) if en.raw_for(name).is_some());
        }
        match (self.kind, value) {
            (PropertyKind::Integer | PropertyKind::BigInt, Value::Int(_)) => true,
            (PropertyKind::Double, Value::Int(_) | Value::Double(_)) => true,
            (PropertyKind::Text, Value::Text(_)) => true,
            (PropertyKind::Timestamp, Value::Timestamp(_)) => true,
            (PropertyKind::Boolean, Value::Bool(_)) => true,
            (PropertyKind::Uuid, Value::Uuid(_)) => true,
            (PropertyKind::Json, Value::Document(_) | Value::Map(_) | Value::List(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub kind: RelationshipKind,
    pub target: String,
    /// Belongs-to property on the target pointing back at this entity.
    pub inverse: Option<String>,
}

impl RelationshipDescriptor {
    pub fn is_belongs_to(&self) -> bool {
        self.kind == RelationshipKind::BelongsTo
    }

    pub fn is_to_many(&self) -> bool {
        self.kind == RelationshipKind::HasMany
    }
}

#[derive(Clone, Debug)]
pub enum PropertyDescriptor {
    Attribute(AttributeDescriptor),
    Relationship(RelationshipDescriptor),
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        match self {
            PropertyDescriptor::Attribute(a) => &a.name,
            PropertyDescriptor::Relationship(r) => &r.name,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeDescriptor> {
        match self {
            PropertyDescriptor::Attribute(a) => Some(a),
            PropertyDescriptor::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipDescriptor> {
        match self {
            PropertyDescriptor::Relationship(r) => Some(r),
            PropertyDescriptor::Attribute(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub table_name: String,
    pub primary_key: String,
    primary: AttributeDescriptor,
    properties: Vec<PropertyDescriptor>,
    index: HashMap<String, usize>,
}

impl EntityDescriptor {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        properties: Vec<PropertyDescriptor>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let primary_key = primary_key.into();
        let primary = properties
            .iter()
            .filter_map(PropertyDescriptor::as_attribute)
            .find(|a| a.name == primary_key)
            .cloned()
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                entity: name.clone(),
                property: primary_key.clone(),
            })?;
        let index = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name().to_string(), i))
            .collect();
        Ok(EntityDescriptor {
            name,
            table_name: table_name.into(),
            primary_key,
            primary,
            properties,
            index,
        })
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Scalar-only subset, declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.properties.iter().filter_map(PropertyDescriptor::as_attribute)
    }

    pub fn primary_key_property(&self) -> &AttributeDescriptor {
        &self.primary
    }
}

/// Immutable, process-wide registry of entity descriptors. Safe to share behind `Arc`.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    entities: HashMap<String, Arc<EntityDescriptor>>,
}

impl Schema {
    pub fn new(entities: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        Schema {
            entities: entities
                .into_iter()
                .map(|e| (e.name.clone(), Arc::new(e)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDescriptor>, QueryError> {
        self.get(name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
