//! Property resolution, per-column mapping and the join tree.

mod column;
mod resolver;
mod row;

pub use column::*;
pub use resolver::*;
pub use row::*;

#[cfg(test)]
pub(crate) fn test_schema() -> crate::config::Schema {
    crate::config::resolve_json(include_str!("../../tests/fixtures/library.json"))
        .expect("library fixture resolves")
}
