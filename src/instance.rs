//! Decoded entity instances and their related sub-instances.

use crate::error::QueryError;
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Related {
    /// Belongs-to / has-one: `None` when the outer join found nothing.
    One(Option<Box<Instance>>),
    Many(Vec<Instance>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub entity: String,
    pub primary_key: String,
    pub values: BTreeMap<String, Value>,
    pub related: BTreeMap<String, Related>,
}

impl Instance {
    pub fn new(entity: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Instance {
            entity: entity.into(),
            primary_key: primary_key.into(),
            values: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &Value {
        self.get(&self.primary_key)
    }

    /// Value of a decoded column; `Null` when it was not fetched.
    pub fn get(&self, key: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(key).unwrap_or(&NULL)
    }

    pub fn one(&self, relationship: &str) -> Option<&Instance> {
        match self.related.get(relationship) {
            Some(Related::One(Some(i))) => Some(i),
            _ => None,
        }
    }

    pub fn many(&self, relationship: &str) -> &[Instance] {
        match self.related.get(relationship) {
            Some(Related::Many(v)) => v,
            _ => &[],
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (k, v) in &self.values {
            map.insert(k.clone(), v.to_json());
        }
        for (k, r) in &self.related {
            let v = match r {
                Related::One(Some(i)) => i.to_json(),
                Related::One(None) => JsonValue::Null,
                Related::Many(items) => JsonValue::Array(items.iter().map(Instance::to_json).collect()),
            };
            map.insert(k.clone(), v);
        }
        JsonValue::Object(map)
    }

    /// Convert into an application type through its serde representation.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, QueryError> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            QueryError::BadRequest(format!("cannot decode {} instance: {}", self.entity, e))
        })
    }
}
