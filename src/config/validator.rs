//! Schema validation: identifiers, referential integrity and relationship consistency.

use crate::config::{PropertyConfig, PropertyKind, RelationshipKind, SchemaConfig};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Identifiers are interpolated into SQL text; only plain names are accepted.
const IDENTIFIER_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

pub fn validate(config: &SchemaConfig) -> Result<(), ConfigError> {
    let ident = Regex::new(IDENTIFIER_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    let check_ident = |kind: &str, s: &str| -> Result<(), ConfigError> {
        if ident.is_match(s) {
            Ok(())
        } else {
            Err(ConfigError::Validation(format!("invalid {} identifier: {:?}", kind, s)))
        }
    };

    let mut enum_names = HashMap::new();
    for e in &config.enums {
        if enum_names.insert(e.name.as_str(), e).is_some() {
            return Err(ConfigError::Validation(format!("duplicate enum: {}", e.name)));
        }
        if e.values.is_empty() {
            return Err(ConfigError::Validation(format!("enum {} has no values", e.name)));
        }
    }

    let mut entities = HashMap::new();
    for ent in &config.entities {
        if entities.insert(ent.name.as_str(), ent).is_some() {
            return Err(ConfigError::Validation(format!("duplicate entity: {}", ent.name)));
        }
        check_ident("table", &ent.table)?;
    }

    for ent in &config.entities {
        let mut seen = HashSet::new();
        for p in &ent.properties {
            check_ident("property", p.name())?;
            if !seen.insert(p.name()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate property {} on {}",
                    p.name(),
                    ent.name
                )));
            }
        }

        let pk_ok = ent
            .properties
            .iter()
            .any(|p| matches!(p, PropertyConfig::Attribute(a) if a.name == ent.primary_key));
        if !pk_ok {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: ent.name.clone(),
                property: ent.primary_key.clone(),
            });
        }

        for p in &ent.properties {
            match p {
                PropertyConfig::Attribute(a) => {
                    let kind: PropertyKind = a
                        .type_
                        .parse()
                        .map_err(ConfigError::Validation)?;
                    if let Some(en) = &a.enum_ {
                        let e = enum_names.get(en.as_str()).ok_or_else(|| ConfigError::MissingReference {
                            kind: "enum",
                            id: en.clone(),
                        })?;
                        for v in &e.values {
                            let fits = match kind {
                                PropertyKind::Text => v.raw.is_string(),
                                PropertyKind::Integer
                                | PropertyKind::BigInt => v.raw.is_i64(),
                                _ => false,
                            };
                            if !fits {
                                return Err(ConfigError::Validation(format!(
                                    "enum {} value {} does not fit {}.{} ({})",
                                    e.name, v.name, ent.name, a.name, a.type_
                                )));
                            }
                        }
                    }
                }
                PropertyConfig::Relationship(r) => {
                    let target = entities.get(r.target.as_str()).ok_or_else(|| ConfigError::MissingReference {
                        kind: "entity",
                        id: r.target.clone(),
                    })?;
                    if r.relationship == RelationshipKind::BelongsTo {
                        continue;
                    }
                    let inverse = r.inverse.as_deref().ok_or_else(|| {
                        ConfigError::Validation(format!(
                            "{}.{} needs an inverse belongs_to on {}",
                            ent.name, r.name, r.target
                        ))
                    })?;
                    let points_back = target.properties.iter().any(|tp| {
                        matches!(tp, PropertyConfig::Relationship(tr)
                            if tr.name == inverse
                                && tr.relationship == RelationshipKind::BelongsTo
                                && tr.target == ent.name)
                    });
                    if !points_back {
                        return Err(ConfigError::Validation(format!(
                            "{}.{} inverse {}.{} is not a belongs_to pointing back",
                            ent.name, r.name, r.target, inverse
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
