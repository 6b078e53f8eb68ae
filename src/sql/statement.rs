//! Statement fragments, the final render step, and positional placeholder rewriting.

use crate::error::QueryError;
use crate::sql::{Params, QueryRequest, StorageValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Select,
}

impl StatementKind {
    /// Kind implied by which inputs a request carries: values with a filter (or the
    /// all-rows opt-in) update, values alone insert, a bare filter deletes, anything else selects.
    pub fn infer(request: &QueryRequest) -> Self {
        let targeted = request.filter.is_some() || request.all_rows;
        if !request.values.is_empty() {
            if targeted {
                StatementKind::Update
            } else {
                StatementKind::Insert
            }
        } else if targeted && !request.has_select_inputs() {
            StatementKind::Delete
        } else {
            StatementKind::Select
        }
    }
}

/// SQL pieces accumulated by the builder; `render` assembles them for one statement kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragments {
    /// Table reference, possibly aliased and followed by JOIN clauses for selects.
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub sets: Vec<String>,
    pub where_: Option<String>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub returning: Vec<String>,
}

impl Fragments {
    pub fn render(&self, kind: StatementKind) -> String {
        let mut sql = match kind {
            StatementKind::Insert => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                self.columns.join(", "),
                self.values.join(", ")
            ),
            StatementKind::Update => format!("UPDATE {} SET {}", self.table, self.sets.join(", ")),
            StatementKind::Delete => format!("DELETE FROM {}", self.table),
            StatementKind::Select => format!("SELECT {} FROM {}", self.columns.join(", "), self.table),
        };
        if kind != StatementKind::Insert {
            if let Some(w) = &self.where_ {
                sql.push_str(" WHERE ");
                sql.push_str(w);
            }
        }
        if kind == StatementKind::Select {
            if !self.order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&self.order.join(", "));
            }
            if let Some(n) = self.limit {
                sql.push_str(&format!(" LIMIT {}", n));
            }
            if let Some(n) = self.offset {
                sql.push_str(&format!(" OFFSET {}", n));
            }
        }
        if matches!(kind, StatementKind::Insert | StatementKind::Update) && !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }
        sql
    }
}

/// Fully assembled statement: SQL with `:name` placeholders and its parameter map.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Params,
}

impl Statement {
    /// Rewrite `:name` placeholders to PostgreSQL `$n`, in first-use order. Casts (`::`)
    /// and quoted text are left alone; a name used twice gets the same number.
    pub fn to_positional(&self) -> Result<(String, Vec<StorageValue>), QueryError> {
        let chars: Vec<char> = self.sql.chars().collect();
        let mut out = String::with_capacity(self.sql.len());
        let mut names: Vec<String> = Vec::new();
        let mut values = Vec::new();
        let mut quote: Option<char> = None;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                out.push(c);
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            let next = chars.get(i + 1).copied();
            match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                    i += 1;
                }
                ':' if next == Some(':') => {
                    out.push_str("::");
                    i += 2;
                }
                ':' if next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_') => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let n = match names.iter().position(|x| *x == name) {
                        Some(p) => p + 1,
                        None => {
                            let value = self
                                .params
                                .get(&name)
                                .cloned()
                                .ok_or_else(|| QueryError::UnknownParameter(name.clone()))?;
                            names.push(name);
                            values.push(value);
                            names.len()
                        }
                    };
                    out.push_str(&format!("${}", n));
                    i = end;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        Ok((out, values))
    }
}
