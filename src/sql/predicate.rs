//! Predicates and their translation into WHERE text plus bindings.

use crate::config::{EntityDescriptor, Schema};
use crate::error::QueryError;
use crate::mapper::{column_mapper, ColumnMapper, ColumnNameOptions, PropertyRef};
use crate::sql::{Params, StorageValue};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl ComparisonOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        property: PropertyRef,
        op: ComparisonOp,
        value: Value,
    },
    IsNull(PropertyRef),
    IsNotNull(PropertyRef),
    In {
        property: PropertyRef,
        values: Vec<Value>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(property: impl Into<PropertyRef>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Predicate::compare(property, ComparisonOp::Eq, value)
    }

    pub fn gt(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Predicate::compare(property, ComparisonOp::Gt, value)
    }

    pub fn lt(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Predicate::compare(property, ComparisonOp::Lt, value)
    }

    pub fn is_in<I, V>(property: impl Into<PropertyRef>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

/// Caller-written WHERE text with `:name` placeholders and its own bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct RawWhere {
    pub sql: String,
    pub bindings: Vec<(String, StorageValue)>,
}

impl RawWhere {
    pub fn new(sql: impl Into<String>) -> Self {
        RawWhere {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: StorageValue) -> Self {
        self.bindings.push((name.into(), value));
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Predicate(Predicate),
    Raw(RawWhere),
}

/// Translates filters for one table level. Column references resolve against `entity`
/// and render qualified with `table` when `namespaced`.
pub struct Translator<'a> {
    pub schema: &'a Schema,
    pub entity: &'a EntityDescriptor,
    pub table: &'a str,
    pub namespaced: bool,
    pub cast_parameters: bool,
}

impl<'a> Translator<'a> {
    /// WHERE text for `filter`; its values are bound into `params`.
    pub fn translate(&self, filter: &Filter, params: &mut Params) -> Result<String, QueryError> {
        match filter {
            Filter::Predicate(p) => self.predicate(p, params),
            Filter::Raw(raw) => {
                for (name, value) in &raw.bindings {
                    params.bind(name.clone(), value.clone())?;
                }
                Ok(raw.sql.clone())
            }
        }
    }

    fn mapper(&self, property: &PropertyRef) -> Result<ColumnMapper, QueryError> {
        column_mapper(self.schema, self.table, self.entity, property)
    }

    fn column(&self, mapper: &ColumnMapper) -> String {
        mapper.column_name(ColumnNameOptions {
            with_type_suffix: !mapper.key_path_keys().is_empty(),
            with_table_namespace: self.namespaced,
            prefix: None,
        })
    }

    fn bind(&self, mapper: &ColumnMapper, value: &Value, params: &mut Params) -> Result<String, QueryError> {
        let stored = mapper.convert_value_for_storage(value)?;
        let name = params.push(stored);
        Ok(placeholder(&name, mapper, self.cast_parameters))
    }

    fn predicate(&self, p: &Predicate, params: &mut Params) -> Result<String, QueryError> {
        Ok(match p {
            Predicate::Compare {
                property,
                op,
                value: Value::Null,
            } if matches!(op, ComparisonOp::Eq | ComparisonOp::NotEq) => {
                let m = self.mapper(property)?;
                let test = if *op == ComparisonOp::Eq { "IS NULL" } else { "IS NOT NULL" };
                format!("{} {}", self.column(&m), test)
            }
            Predicate::Compare { property, op, value } => {
                let m = self.mapper(property)?;
                let rhs = self.bind(&m, value, params)?;
                format!("{} {} {}", self.column(&m), op.symbol(), rhs)
            }
            Predicate::IsNull(property) => {
                let m = self.mapper(property)?;
                format!("{} IS NULL", self.column(&m))
            }
            Predicate::IsNotNull(property) => {
                let m = self.mapper(property)?;
                format!("{} IS NOT NULL", self.column(&m))
            }
            Predicate::In { property, values } => {
                let m = self.mapper(property)?;
                if values.is_empty() {
                    return Ok("FALSE".into());
                }
                let list = values
                    .iter()
                    .map(|v| self.bind(&m, v, params))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{} IN ({})", self.column(&m), list.join(", "))
            }
            Predicate::And(parts) => self.join(parts, " AND ", "TRUE", params)?,
            Predicate::Or(parts) => self.join(parts, " OR ", "FALSE", params)?,
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner, params)?),
        })
    }

    fn join(&self, parts: &[Predicate], sep: &str, empty: &str, params: &mut Params) -> Result<String, QueryError> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let rendered = parts
            .iter()
            .map(|p| self.predicate(p, params).map(|s| format!("({})", s)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(sep))
    }
}

/// `:name`, with the column's cast when requested.
pub fn placeholder(name: &str, mapper: &ColumnMapper, cast: bool) -> String {
    if cast {
        format!(":{}{}", name, mapper.type_suffix())
    } else {
        format!(":{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{test_schema, KeyPath, PathKey};

    fn translate(filter: &Filter, namespaced: bool) -> Result<(String, Params), QueryError> {
        let schema = test_schema();
        let book = schema.get("Book").unwrap();
        let t = Translator {
            schema: &schema,
            entity: book,
            table: "books",
            namespaced,
            cast_parameters: true,
        };
        let mut params = Params::new();
        let sql = t.translate(filter, &mut params)?;
        Ok((sql, params))
    }

    #[test]
    fn compare_binds_converted_value() {
        let f = Filter::Predicate(Predicate::eq("status", Value::Enum("Draft".into())));
        let (sql, params) = translate(&f, false).unwrap();
        assert_eq!(sql, "\"status\" = :p1::text");
        assert_eq!(params.get("p1"), Some(&StorageValue::String("draft".into())));
    }

    #[test]
    fn nested_boolean_logic() {
        let f = Filter::Predicate(
            Predicate::gt("id", 10)
                .and(Predicate::eq("title", "Dune").or(Predicate::IsNull("published_at".into())))
                .negate(),
        );
        let (sql, params) = translate(&f, true).unwrap();
        assert_eq!(
            sql,
            "NOT ((\"books\".\"id\" > :p1::int8) AND ((\"books\".\"title\" = :p2::text) OR (\"books\".\"published_at\" IS NULL)))"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let f = Filter::Predicate(Predicate::eq("title", Value::Null));
        assert_eq!(translate(&f, false).unwrap().0, "\"title\" IS NULL");
    }

    #[test]
    fn empty_in_is_false() {
        let f = Filter::Predicate(Predicate::is_in("id", Vec::<i64>::new()));
        assert_eq!(translate(&f, false).unwrap().0, "FALSE");
        let f = Filter::Predicate(Predicate::is_in("id", [1i64, 2]));
        assert_eq!(translate(&f, false).unwrap().0, "\"id\" IN (:p1::int8, :p2::int8)");
    }

    #[test]
    fn key_path_compares_as_jsonb() {
        let path = KeyPath::new("metadata", [PathKey::from("pages")]);
        let f = Filter::Predicate(Predicate::gt(path, 300));
        let (sql, params) = translate(&f, false).unwrap();
        assert_eq!(sql, "(\"metadata\"->'pages')::jsonb > :p1::jsonb");
        assert_eq!(params.get("p1"), Some(&StorageValue::Json(serde_json::json!(300))));
    }

    #[test]
    fn raw_where_keeps_caller_bindings() {
        let raw = RawWhere::new("lower(title) = :needle").bind("needle", StorageValue::String("dune".into()));
        let (sql, params) = translate(&Filter::Raw(raw), false).unwrap();
        assert_eq!(sql, "lower(title) = :needle");
        assert_eq!(params.get("needle"), Some(&StorageValue::String("dune".into())));
    }

    #[test]
    fn unknown_property_fails() {
        let f = Filter::Predicate(Predicate::eq("isbn", "x"));
        assert!(matches!(translate(&f, false), Err(QueryError::UnknownColumn { .. })));
    }
}
