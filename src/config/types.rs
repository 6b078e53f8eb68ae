//! Raw schema config types matching the JSON schema document.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumValueConfig {
    pub name: String,
    /// Stored primitive (string or integer).
    pub raw: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumConfig {
    pub name: String,
    pub values: Vec<EnumValueConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    BelongsTo,
    HasOne,
    HasMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    pub relationship: RelationshipKind,
    pub target: String,
    /// Belongs-to property on the target that points back (required for has_one / has_many).
    #[serde(default)]
    pub inverse: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, rename = "enum")]
    pub enum_: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub has_default: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyConfig {
    Relationship(RelationshipConfig),
    Attribute(AttributeConfig),
}

impl PropertyConfig {
    pub fn name(&self) -> &str {
        match self {
            PropertyConfig::Relationship(r) => &r.name,
            PropertyConfig::Attribute(a) => &a.name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub properties: Vec<PropertyConfig>,
}

/// Whole schema document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub enums: Vec<EnumConfig>,
    pub entities: Vec<EntityConfig>,
}
