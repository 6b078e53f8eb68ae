//! Storage-side values bound to PostgreSQL, and the per-statement parameter map.

use crate::error::QueryError;
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A value in the storage domain. Bound directly by the driver and produced when decoding rows.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Timestamp(NaiveDateTime),
    Json(Value),
}

impl StorageValue {
    /// Loose conversion for caller-supplied raw bindings. Objects and arrays become JSON.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => StorageValue::Null,
            Value::Bool(b) => StorageValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StorageValue::I64(i),
                None => StorageValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => StorageValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => StorageValue::Json(v.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StorageValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            StorageValue::Null => Value::Null,
            StorageValue::Bool(b) => Value::Bool(*b),
            StorageValue::I64(n) => Value::Number((*n).into()),
            StorageValue::F64(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StorageValue::String(s) => Value::String(s.clone()),
            StorageValue::Uuid(u) => Value::String(u.to_string()),
            StorageValue::Timestamp(t) => {
                Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            StorageValue::Json(v) => v.clone(),
        }
    }

    /// Stable text form used to compare row identities while decoding.
    pub fn identity_key(&self) -> Option<String> {
        match self {
            StorageValue::Null => None,
            other => Some(other.to_json().to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for StorageValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            StorageValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            StorageValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            StorageValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            StorageValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            StorageValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            StorageValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf)?,
            StorageValue::Timestamp(t) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(t, buf)?,
            StorageValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        match self {
            // oid 0 leaves the parameter type to the server, which infers it from the column
            StorageValue::Null => Some(PgTypeInfo::with_oid(Oid(0))),
            StorageValue::Bool(_) => Some(<bool as Type<Postgres>>::type_info()),
            StorageValue::I64(_) => Some(<i64 as Type<Postgres>>::type_info()),
            StorageValue::F64(_) => Some(<f64 as Type<Postgres>>::type_info()),
            StorageValue::String(_) => Some(<String as Type<Postgres>>::type_info()),
            StorageValue::Uuid(_) => Some(<uuid::Uuid as Type<Postgres>>::type_info()),
            StorageValue::Timestamp(_) => Some(<NaiveDateTime as Type<Postgres>>::type_info()),
            StorageValue::Json(_) => Some(<Value as Type<Postgres>>::type_info()),
        }
    }
}

impl Type<Postgres> for StorageValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

/// Named substitution values for one statement, in binding order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, StorageValue)>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Bind a value under the next free generated name (`p1`, `p2`, ...) and return that name.
    pub fn push(&mut self, value: StorageValue) -> String {
        let mut n = self.entries.len() + 1;
        let mut name = format!("p{}", n);
        while self.get(&name).is_some() {
            n += 1;
            name = format!("p{}", n);
        }
        self.entries.push((name.clone(), value));
        name
    }

    /// Bind a caller-chosen name. A name already bound in this statement is refused.
    pub fn bind(&mut self, name: impl Into<String>, value: StorageValue) -> Result<(), QueryError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(QueryError::BadRequest(format!(
                "parameter :{} is already bound in this statement",
                name
            )));
        }
        self.entries.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StorageValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StorageValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
