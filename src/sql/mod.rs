//! Safe SQL builder: identifiers from config only, values as named parameters.

mod builder;
pub mod params;
mod predicate;
mod request;
mod statement;

pub use builder::*;
pub use params::*;
pub use predicate::*;
pub use request::*;
pub use statement::*;
