//! Filter expressions over registration fields.
//!
//! # Responsibility
//! - Model caller-supplied filters as typed expression trees.
//! - Parse `filter[field][op]=value` query parameters into expressions.
//!
//! # See also
//! - `repo::node_repo` compiles expressions into SQL.

pub mod expr;
pub mod params;

pub use expr::{FieldComparison, FilterExpr, FilterOp, FilterValue};
pub use params::{field_spec, parse_filter_params, FieldKind, FieldSpec, FilterError};
