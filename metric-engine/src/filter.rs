//! FILENAME: metric-engine/src/filter.rs
//! PURPOSE: Applies a conjunction of filter conditions to a row set.
//! CONTEXT: Every group computes over the rows that pass all of its
//! conditions plus the implicit hierarchy condition. Filtering never mutates
//! or copies rows; the result borrows from the input slice.
//!
//! OPERATORS:
//! - `=` / `!=`     : case-insensitive comparison of string forms
//! - `>` `<` `>=` `<=` : numeric comparison; a non-numeric side compares false
//! - `contains`     : case-insensitive substring test on string forms
//! - anything else  : governed by `UnknownOperatorPolicy`

use serde::{Deserialize, Serialize};

use crate::definition::FilterCondition;
use crate::logging::FILTER;
use crate::value::{CellValue, Row};
use crate::{log_debug, log_warn};

/// Comparison operator of a filter condition.
/// Serialized as its symbol; unrecognized symbols survive as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    Unknown(String),
}

impl FilterOperator {
    pub fn parse(symbol: &str) -> Self {
        match symbol.trim() {
            "=" | "==" => FilterOperator::Equal,
            "!=" | "<>" => FilterOperator::NotEqual,
            ">" => FilterOperator::GreaterThan,
            "<" => FilterOperator::LessThan,
            ">=" => FilterOperator::GreaterOrEqual,
            "<=" => FilterOperator::LessOrEqual,
            s if s.eq_ignore_ascii_case("contains") => FilterOperator::Contains,
            s => FilterOperator::Unknown(s.to_string()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::LessThan => "<",
            FilterOperator::GreaterOrEqual => ">=",
            FilterOperator::LessOrEqual => "<=",
            FilterOperator::Contains => "contains",
            FilterOperator::Unknown(s) => s,
        }
    }
}

impl From<String> for FilterOperator {
    fn from(symbol: String) -> Self {
        FilterOperator::parse(&symbol)
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.symbol().to_string()
    }
}

/// What a condition with an unrecognized operator does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOperatorPolicy {
    /// The condition passes every row (fail open).
    #[default]
    Pass,
    /// The condition rejects every row (fail closed).
    Reject,
}

/// Returns the rows that satisfy every condition, in input order.
/// An empty condition list returns every row.
pub fn filter_rows<'a>(
    rows: &'a [Row],
    conditions: &[FilterCondition],
    policy: UnknownOperatorPolicy,
) -> Vec<&'a Row> {
    for cond in conditions {
        if let FilterOperator::Unknown(op) = &cond.operator {
            log_warn!(
                FILTER,
                "unknown operator '{}' on column {} (policy={:?})",
                op,
                cond.column,
                policy
            );
        }
    }

    let passed: Vec<&Row> = rows
        .iter()
        .filter(|row| conditions.iter().all(|c| row_matches(row, c, policy)))
        .collect();

    log_debug!(
        FILTER,
        "filter_rows conditions={} rows={} passed={}",
        conditions.len(),
        rows.len(),
        passed.len()
    );
    passed
}

/// Evaluates one condition against one row.
pub fn row_matches(row: &Row, condition: &FilterCondition, policy: UnknownOperatorPolicy) -> bool {
    if let FilterOperator::Unknown(_) = condition.operator {
        return policy == UnknownOperatorPolicy::Pass;
    }

    // Absent column: always false
    let Some(cell) = row.get(&condition.column) else {
        return false;
    };

    compare(cell, &condition.operator, &condition.value)
}

fn compare(cell: &CellValue, op: &FilterOperator, literal: &CellValue) -> bool {
    match op {
        FilterOperator::Equal => text_eq(cell, literal),
        FilterOperator::NotEqual => !text_eq(cell, literal),
        FilterOperator::GreaterThan => numeric(cell, literal, |a, b| a > b),
        FilterOperator::LessThan => numeric(cell, literal, |a, b| a < b),
        FilterOperator::GreaterOrEqual => numeric(cell, literal, |a, b| a >= b),
        FilterOperator::LessOrEqual => numeric(cell, literal, |a, b| a <= b),
        FilterOperator::Contains => cell
            .as_text()
            .to_lowercase()
            .contains(&literal.as_text().to_lowercase()),
        FilterOperator::Unknown(_) => false,
    }
}

fn text_eq(a: &CellValue, b: &CellValue) -> bool {
    a.as_text().to_lowercase() == b.as_text().to_lowercase()
}

fn numeric(a: &CellValue, b: &CellValue, cmp: fn(f64, f64) -> bool) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

/// Columns named by the conditions that no row carries.
/// Used to attach `COLUMN_NOT_FOUND` warnings to a group.
pub fn missing_columns(rows: &[Row], conditions: &[FilterCondition]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for cond in conditions {
        if matches!(cond.operator, FilterOperator::Unknown(_)) {
            continue;
        }
        let present = rows.iter().any(|r| r.contains_key(&cond.column));
        if !present && !rows.is_empty() && !missing.contains(&cond.column) {
            missing.push(cond.column.clone());
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::row;

    fn sample() -> Vec<Row> {
        vec![
            row([("region", CellValue::from("North")), ("price", CellValue::from(10.0))]),
            row([("region", CellValue::from("north")), ("price", CellValue::from("20"))]),
            row([("region", CellValue::from("South")), ("price", CellValue::from(999.0))]),
            row([("region", CellValue::from("East")), ("price", CellValue::Null)]),
        ]
    }

    fn cond(column: &str, op: &str, value: impl Into<CellValue>) -> FilterCondition {
        FilterCondition::new(column, FilterOperator::parse(op), value)
    }

    #[test]
    fn empty_condition_list_keeps_all_rows() {
        let rows = sample();
        assert_eq!(filter_rows(&rows, &[], UnknownOperatorPolicy::Pass).len(), 4);
    }

    #[test]
    fn equality_is_case_insensitive() {
        let rows = sample();
        let out = filter_rows(&rows, &[cond("region", "=", "NORTH")], UnknownOperatorPolicy::Pass);
        assert_eq!(out.len(), 2);

        let out = filter_rows(&rows, &[cond("region", "!=", "north")], UnknownOperatorPolicy::Pass);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn numeric_comparison_skips_non_numeric_cells() {
        let rows = sample();
        let out = filter_rows(&rows, &[cond("price", ">", 15.0)], UnknownOperatorPolicy::Pass);
        assert_eq!(out.len(), 2);

        // Null price never satisfies either side
        let out = filter_rows(&rows, &[cond("price", "<=", 15.0)], UnknownOperatorPolicy::Pass);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn contains_is_case_insensitive_substring() {
        let rows = sample();
        let out = filter_rows(&rows, &[cond("region", "contains", "OR")], UnknownOperatorPolicy::Pass);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn conditions_form_a_conjunction() {
        let rows = sample();
        let out = filter_rows(
            &rows,
            &[cond("region", "=", "north"), cond("price", ">=", 20.0)],
            UnknownOperatorPolicy::Pass,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["price"], CellValue::Text("20".into()));
    }

    #[test]
    fn absent_column_matches_nothing() {
        let rows = sample();
        let out = filter_rows(&rows, &[cond("city", "!=", "x")], UnknownOperatorPolicy::Pass);
        assert!(out.is_empty());
        assert_eq!(missing_columns(&rows, &[cond("city", "=", "x")]), vec!["city"]);
    }

    #[test]
    fn unknown_operator_follows_policy() {
        let rows = sample();
        let conditions = [cond("region", "starts_with", "N")];

        assert_eq!(
            conditions[0].operator,
            FilterOperator::Unknown("starts_with".into())
        );
        assert_eq!(filter_rows(&rows, &conditions, UnknownOperatorPolicy::Pass).len(), 4);
        assert!(filter_rows(&rows, &conditions, UnknownOperatorPolicy::Reject).is_empty());
    }

    #[test]
    fn operator_round_trips_through_its_symbol() {
        let json = serde_json::to_string(&FilterOperator::GreaterOrEqual).unwrap();
        assert_eq!(json, "\">=\"");

        let op: FilterOperator = serde_json::from_str("\"between\"").unwrap();
        assert_eq!(op.symbol(), "between");
    }
}
