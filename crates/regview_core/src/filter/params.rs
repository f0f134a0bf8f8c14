//! `filter[field][op]=value` query parameter parsing.
//!
//! # Responsibility
//! - Validate filter fields against the registration field table.
//! - Pick default operators and reject operator/field type mismatches.
//! - Convert raw string values into typed `FilterValue`s.
//!
//! # Invariants
//! - Keys that do not look like filters are ignored, never rejected.
//! - Multiple filters always combine with AND.

use crate::filter::expr::{FilterExpr, FilterOp, FilterValue};
use crate::model::node::NodeCategory;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static QUERY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^filter\[(?P<field>\w+)\](\[(?P<op>\w+)\])?$").expect("valid filter key regex")
});
static DATETIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?P<time>T\d{2}:\d{2}(:\d{2}(\.\d{1,6})?)?)").expect("valid datetime regex")
});

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Value shape of a declared registration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Node identifier; filters accept comma separated bulk lists.
    Id,
    /// Free text; defaults to `icontains`.
    Text,
    /// One of a fixed set of choices.
    Choice,
    Bool,
    DateTime,
    /// List of strings; defaults to `contains`.
    List,
    /// Reference to another object by id; `null` means "no value".
    Relationship,
    /// Structured value that cannot be filtered.
    Opaque,
}

impl FieldKind {
    fn default_op(self) -> FilterOp {
        match self {
            Self::Text => FilterOp::Icontains,
            Self::List => FilterOp::Contains,
            _ => FilterOp::Eq,
        }
    }

    fn valid_ops(self) -> Vec<FilterOp> {
        match self {
            Self::DateTime => FilterOp::COMPARISON
                .into_iter()
                .chain(FilterOp::DEFAULT)
                .collect(),
            Self::Text | Self::List => FilterOp::MATCH.into_iter().chain(FilterOp::DEFAULT).collect(),
            _ => FilterOp::DEFAULT.to_vec(),
        }
    }
}

/// Declared field of the registration view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub filterable: bool,
}

const fn field(name: &'static str, kind: FieldKind, filterable: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        filterable,
    }
}

/// Declared fields of the registration view and which ones accept filters.
pub const REGISTRATION_FIELDS: &[FieldSpec] = &[
    field("id", FieldKind::Id, true),
    field("title", FieldKind::Text, true),
    field("description", FieldKind::Text, true),
    field("date_created", FieldKind::DateTime, true),
    field("registration", FieldKind::Bool, false),
    field("withdrawn", FieldKind::Bool, false),
    field("date_registered", FieldKind::DateTime, false),
    field("withdrawal_justification", FieldKind::Text, false),
    field("registration_supplement", FieldKind::Text, false),
    field("contributors", FieldKind::Relationship, true),
    field("category", FieldKind::Choice, true),
    field("date_modified", FieldKind::DateTime, true),
    field("fork", FieldKind::Bool, false),
    field("collection", FieldKind::Bool, false),
    field("node_license", FieldKind::Opaque, false),
    field("tags", FieldKind::List, true),
    field("public", FieldKind::Bool, true),
    field("current_user_permissions", FieldKind::List, false),
    field("pending_embargo_approval", FieldKind::Bool, false),
    field("pending_registration_approval", FieldKind::Bool, false),
    field("pending_withdrawal", FieldKind::Bool, false),
    field("embargo_end_date", FieldKind::DateTime, false),
    field("registered_meta", FieldKind::Opaque, false),
    field("registered_by", FieldKind::Relationship, false),
    field("registered_from", FieldKind::Relationship, false),
    field("parent", FieldKind::Relationship, true),
    field("root", FieldKind::Id, true),
    field("linked_nodes_count", FieldKind::Opaque, false),
];

/// Looks up a declared registration field by name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    REGISTRATION_FIELDS.iter().find(|spec| spec.name == name)
}

/// Query filter validation failures. All map to HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Field is not declared on the resource.
    InvalidFilterField(String),
    /// Field is declared but filtering on it is not supported.
    FieldNotFilterable(String),
    InvalidOperator {
        op: String,
        valid: Vec<FilterOp>,
    },
    /// Comparison operator used on a field that is not a date.
    ComparisonType(String),
    /// Match operator used on a field that is not text or a list.
    MatchType(String),
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },
}

impl Display for FilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFilterField(name) => {
                write!(f, "'{name}' is not a valid field for this endpoint.")
            }
            Self::FieldNotFilterable(name) => {
                write!(f, "'{name}' is not a filterable field.")
            }
            Self::InvalidOperator { op, valid } => {
                let valid = valid
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Value '{op}' is not a supported filter operator; use one of {valid}.")
            }
            Self::ComparisonType(name) => write!(
                f,
                "Field '{name}' does not support comparison operators in a filter."
            ),
            Self::MatchType(name) => {
                write!(f, "Field '{name}' does not support match operators in a filter.")
            }
            Self::InvalidValue {
                field,
                value,
                expected,
            } => write!(
                f,
                "Value '{value}' is not valid for field '{field}'; expected {expected}."
            ),
        }
    }
}

impl Error for FilterError {}

/// Parses filter query parameters into one AND-ed expression.
///
/// Returns `Ok(None)` when no parameter is a filter.
pub fn parse_filter_params<'a, I>(params: I) -> Result<Option<FilterExpr>, FilterError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut parts: Vec<FilterExpr> = Vec::new();

    for (key, value) in params {
        let Some(captures) = QUERY_PATTERN.captures(key) else {
            continue;
        };
        let field_name = captures["field"].trim();
        let spec = field_spec(field_name)
            .ok_or_else(|| FilterError::InvalidFilterField(field_name.to_string()))?;
        if !spec.filterable {
            return Err(FilterError::FieldNotFilterable(field_name.to_string()));
        }

        let op = match captures.name("op") {
            Some(raw) => validate_operator(spec, raw.as_str())?,
            None => spec.kind.default_op(),
        };
        parts.extend(comparisons_for(spec, op, value)?);
    }

    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(FilterExpr::And(parts)),
    })
}

fn validate_operator(spec: &FieldSpec, raw: &str) -> Result<FilterOp, FilterError> {
    let op = FilterOp::parse(raw).ok_or_else(|| FilterError::InvalidOperator {
        op: raw.to_string(),
        valid: spec.kind.valid_ops(),
    })?;

    if op.is_comparison() && spec.kind != FieldKind::DateTime {
        return Err(FilterError::ComparisonType(spec.name.to_string()));
    }
    if op.is_match() && !matches!(spec.kind, FieldKind::Text | FieldKind::List) {
        return Err(FilterError::MatchType(spec.name.to_string()));
    }
    Ok(op)
}

fn comparisons_for(
    spec: &FieldSpec,
    op: FilterOp,
    raw: &str,
) -> Result<Vec<FilterExpr>, FilterError> {
    let invalid = |expected: &'static str| FilterError::InvalidValue {
        field: spec.name.to_string(),
        value: raw.to_string(),
        expected,
    };

    let value = match spec.kind {
        FieldKind::DateTime => return date_comparisons(spec, op, raw),
        FieldKind::Id => {
            let ids = bulk_values(raw)
                .into_iter()
                .map(|value| parse_uuid(value).ok_or_else(|| invalid("a node id")))
                .collect::<Result<Vec<_>, _>>()?;
            if ids.is_empty() {
                return Err(invalid("a node id"));
            }
            let op = match op {
                FilterOp::Eq => FilterOp::In,
                other => other,
            };
            let value = match (op, ids.as_slice()) {
                (FilterOp::In, _) => FilterValue::List(ids),
                (_, [single]) => FilterValue::Text(single.clone()),
                _ => return Err(invalid("a single node id")),
            };
            return Ok(vec![FilterExpr::compare(spec.name, op, value)]);
        }
        FieldKind::Bool => FilterValue::Bool(parse_bool(raw).ok_or_else(|| invalid("bool"))?),
        FieldKind::Choice => {
            let category = NodeCategory::parse(raw.trim()).ok_or_else(|| invalid("a category"))?;
            FilterValue::Text(category.as_str().to_string())
        }
        FieldKind::Relationship => {
            if raw == "null" {
                FilterValue::Null
            } else {
                FilterValue::Text(parse_uuid(raw).ok_or_else(|| invalid("an id or null"))?)
            }
        }
        FieldKind::List => {
            if raw == "null" {
                FilterValue::Null
            } else {
                FilterValue::Text(raw.trim().to_lowercase())
            }
        }
        FieldKind::Text => FilterValue::Text(raw.to_string()),
        FieldKind::Opaque => return Err(FilterError::FieldNotFilterable(spec.name.to_string())),
    };

    Ok(vec![FilterExpr::compare(spec.name, op, value)])
}

/// Bare dates compared with `eq` match the whole UTC day.
fn date_comparisons(
    spec: &FieldSpec,
    op: FilterOp,
    raw: &str,
) -> Result<Vec<FilterExpr>, FilterError> {
    let raw = raw.trim();
    let invalid = || FilterError::InvalidValue {
        field: spec.name.to_string(),
        value: raw.to_string(),
        expected: "date",
    };

    if op == FilterOp::Eq && !DATETIME_PATTERN.is_match(raw) {
        let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
        let start = day.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        let stop = start + TimeDelta::days(1);
        return Ok(vec![
            FilterExpr::compare(
                spec.name,
                FilterOp::Gte,
                FilterValue::Timestamp(start.and_utc().timestamp_millis()),
            ),
            FilterExpr::compare(
                spec.name,
                FilterOp::Lt,
                FilterValue::Timestamp(stop.and_utc().timestamp_millis()),
            ),
        ]);
    }

    let millis = parse_timestamp_millis(raw).ok_or_else(invalid)?;
    Ok(vec![FilterExpr::compare(
        spec.name,
        op,
        FilterValue::Timestamp(millis),
    )])
}

/// Parses RFC 3339, naive ISO 8601 (treated as UTC) or bare dates.
pub fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc().timestamp_millis())
}

fn bulk_values(raw: &str) -> Vec<&str> {
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_uuid(raw: &str) -> Option<String> {
    Uuid::parse_str(raw.trim()).ok().map(|id| id.to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_timestamp_millis, REGISTRATION_FIELDS};
    use crate::model::registration::{WITHDRAWAL_REDACTED_FIELDS, WITHDRAWAL_VISIBLE_FIELDS};

    #[test]
    fn field_table_matches_view_fields() {
        let declared: Vec<&str> = REGISTRATION_FIELDS.iter().map(|spec| spec.name).collect();
        for name in WITHDRAWAL_VISIBLE_FIELDS.iter().chain(WITHDRAWAL_REDACTED_FIELDS) {
            assert!(declared.contains(name), "{name} missing from field table");
        }
        assert_eq!(
            declared.len(),
            WITHDRAWAL_VISIBLE_FIELDS.len() + WITHDRAWAL_REDACTED_FIELDS.len()
        );
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_timestamp_supports_dates_and_datetimes() {
        assert_eq!(parse_timestamp_millis("1970-01-02"), Some(86_400_000));
        assert_eq!(parse_timestamp_millis("1970-01-01T00:00:01"), Some(1_000));
        assert_eq!(parse_timestamp_millis("1970-01-01T01:00:00+01:00"), Some(0));
        assert_eq!(parse_timestamp_millis("yesterday"), None);
    }
}
