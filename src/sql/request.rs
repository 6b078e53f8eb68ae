//! Declarative description of one statement: values, filter, ordering, paging, joins.

use crate::mapper::PropertyRef;
use crate::sql::{Filter, Predicate, RawWhere};
use crate::value::Value;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub const fn keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortDescriptor {
    pub property: PropertyRef,
    pub order: SortOrder,
}

impl SortDescriptor {
    pub fn asc(property: impl Into<PropertyRef>) -> Self {
        SortDescriptor {
            property: property.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(property: impl Into<PropertyRef>) -> Self {
        SortDescriptor {
            property: property.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Cursor paging: order by `property` and start strictly after `after` when given.
#[derive(Clone, Debug, PartialEq)]
pub struct PageDescriptor {
    pub property: String,
    pub order: SortOrder,
    pub after: Option<Value>,
}

impl PageDescriptor {
    pub fn new(property: impl Into<String>, order: SortOrder) -> Self {
        PageDescriptor {
            property: property.into(),
            order,
            after: None,
        }
    }

    pub fn after(mut self, bound: impl Into<Value>) -> Self {
        self.after = Some(bound.into());
        self
    }
}

/// Nested sub-query over a relationship: its `returning`, filter and joins apply to the joined level.
#[derive(Clone, Debug)]
pub struct Join {
    pub property: String,
    pub request: QueryRequest,
}

#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    /// Property name → value, in assignment order.
    pub values: Vec<(String, Value)>,
    pub filter: Option<Filter>,
    pub sort: Vec<SortDescriptor>,
    pub page: Option<PageDescriptor>,
    pub joins: Vec<Join>,
    pub returning: Vec<PropertyRef>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Explicit opt-in for update/delete without a filter.
    pub all_rows: bool,
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new() -> Self {
        QueryRequest::default()
    }

    pub fn set(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((property.into(), value.into()));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(Filter::Predicate(predicate));
        self
    }

    pub fn raw_where(mut self, raw: RawWhere) -> Self {
        self.filter = Some(Filter::Raw(raw));
        self
    }

    pub fn sort(mut self, sort: SortDescriptor) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn page(mut self, page: PageDescriptor) -> Self {
        self.page = Some(page);
        self
    }

    pub fn join(mut self, property: impl Into<String>, request: QueryRequest) -> Self {
        self.joins.push(Join {
            property: property.into(),
            request,
        });
        self
    }

    pub fn returning<I, P>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyRef>,
    {
        self.returning.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether any select-only input (projection, ordering, paging, joins) is present.
    pub fn has_select_inputs(&self) -> bool {
        !self.returning.is_empty()
            || !self.sort.is_empty()
            || self.page.is_some()
            || !self.joins.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
    }
}
