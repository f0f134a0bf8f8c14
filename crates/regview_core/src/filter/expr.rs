//! Filter expression model.
//!
//! Expressions are trees of field comparisons joined by `And`/`Or`. They name
//! fields by their view name (`date_created`, `public`, ...); mapping to
//! storage columns is the store's job.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    Icontains,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Membership in a list value. Produced for bulk id filters only.
    In,
}

impl FilterOp {
    pub const MATCH: [FilterOp; 2] = [Self::Contains, Self::Icontains];
    pub const COMPARISON: [FilterOp; 4] = [Self::Gt, Self::Gte, Self::Lt, Self::Lte];
    pub const DEFAULT: [FilterOp; 2] = [Self::Eq, Self::Ne];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::Icontains => "icontains",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
        }
    }

    /// Parses an operator accepted in query parameters.
    ///
    /// `in` is internal and is rejected here.
    pub fn parse(value: &str) -> Option<Self> {
        Self::MATCH
            .into_iter()
            .chain(Self::COMPARISON)
            .chain(Self::DEFAULT)
            .find(|op| op.as_str() == value)
    }

    pub fn is_comparison(self) -> bool {
        Self::COMPARISON.contains(&self)
    }

    pub fn is_match(self) -> bool {
        Self::MATCH.contains(&self)
    }
}

impl Display for FilterOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Text(String),
    /// Unix epoch milliseconds.
    Timestamp(i64),
    List(Vec<String>),
}

/// One `field op value` comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldComparison {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// Conjunction/disjunction of field comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Compare(FieldComparison),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn compare(field: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self::Compare(FieldComparison {
            field: field.into(),
            op,
            value,
        })
    }

    /// Joins two expressions with AND, flattening nested conjunctions.
    pub fn and(self, other: FilterExpr) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Joins two expressions with OR, flattening nested disjunctions.
    pub fn or(self, other: FilterExpr) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, Self::Or(mut right)) => {
                right.insert(0, left);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Every comparison in the tree, depth-first.
    pub fn comparisons(&self) -> Vec<&FieldComparison> {
        let mut found = Vec::new();
        self.collect_comparisons(&mut found);
        found
    }

    fn collect_comparisons<'a>(&'a self, found: &mut Vec<&'a FieldComparison>) {
        match self {
            Self::Compare(comparison) => found.push(comparison),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_comparisons(found);
                }
            }
        }
    }

    /// Whether any comparison names a field contained in `fields`.
    pub fn references_any(&self, fields: &BTreeSet<String>) -> bool {
        self.comparisons()
            .iter()
            .any(|comparison| fields.contains(&comparison.field))
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterExpr, FilterOp, FilterValue};
    use std::collections::BTreeSet;

    fn eq(field: &str, value: &str) -> FilterExpr {
        FilterExpr::compare(field, FilterOp::Eq, FilterValue::Text(value.to_string()))
    }

    #[test]
    fn parse_rejects_internal_in_operator() {
        assert_eq!(FilterOp::parse("gte"), Some(FilterOp::Gte));
        assert_eq!(FilterOp::parse("in"), None);
        assert_eq!(FilterOp::parse("like"), None);
    }

    #[test]
    fn and_flattens_nested_conjunctions() {
        let expr = eq("title", "a").and(eq("category", "data")).and(eq("tags", "x"));
        match expr {
            FilterExpr::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected expression: {other:?}"),
        }
    }

    #[test]
    fn references_any_walks_or_groups() {
        let expr = eq("title", "a").and(eq("id", "1").or(eq("category", "data")));
        let redacted: BTreeSet<String> = ["category".to_string()].into();
        assert!(expr.references_any(&redacted));

        let other: BTreeSet<String> = ["tags".to_string()].into();
        assert!(!expr.references_any(&other));
    }
}
