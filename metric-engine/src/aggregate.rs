//! FILENAME: metric-engine/src/aggregate.rs
//! PURPOSE: The aggregation functions of metric templates and formula reducers.
//! CONTEXT: Vectors handed to these functions already exclude null and
//! non-numeric cells, so `COUNT` and `AVG` denominators count numeric values
//! only. Every function yields 0 for an empty vector except `COUNT`, which
//! yields the (zero) length.

use rustc_hash::FxHashSet;

use crate::definition::AggregateFunction;
use crate::value::Row;

/// Default rank for `PERCENTILE` when the template does not set one.
pub const DEFAULT_PERCENTILE: f64 = 50.0;

/// Applies a numeric aggregate to a vector.
/// `COUNT_DISTINCT` here counts distinct numbers; the column form in
/// `aggregate_column` counts distinct string forms instead.
pub fn evaluate_aggregate(function: AggregateFunction, values: &[f64], percentile: Option<f64>) -> f64 {
    match function {
        AggregateFunction::Sum => values.iter().sum(),
        AggregateFunction::Avg => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        AggregateFunction::Min => values.iter().copied().reduce(f64::min).unwrap_or(0.0),
        AggregateFunction::Max => values.iter().copied().reduce(f64::max).unwrap_or(0.0),
        AggregateFunction::Count => values.len() as f64,
        AggregateFunction::CountDistinct => {
            let distinct: FxHashSet<u64> = values.iter().map(|v| normalize_zero(*v).to_bits()).collect();
            distinct.len() as f64
        }
        AggregateFunction::Median => percentile_of(values, 50.0),
        AggregateFunction::Percentile => {
            percentile_of(values, percentile.unwrap_or(DEFAULT_PERCENTILE))
        }
    }
}

/// Applies an aggregate to one column of a row subset.
pub fn aggregate_column(
    function: AggregateFunction,
    rows: &[&Row],
    column: &str,
    percentile: Option<f64>,
) -> f64 {
    if function == AggregateFunction::CountDistinct {
        let distinct: FxHashSet<String> = rows
            .iter()
            .filter_map(|r| r.get(column))
            .map(|c| c.as_text())
            .filter(|s| !s.trim().is_empty())
            .collect();
        return distinct.len() as f64;
    }

    let values = numeric_column(rows, column);
    evaluate_aggregate(function, &values, percentile)
}

/// Numeric values of a column, skipping cells without a numeric view.
pub fn numeric_column(rows: &[&Row], column: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|r| r.get(column))
        .filter_map(|c| c.as_number())
        .collect()
}

/// Linear interpolation between closest ranks. `p` is clamped to 0..=100.
fn percentile_of(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p = if p.is_finite() { p.clamp(0.0, 100.0) } else { DEFAULT_PERCENTILE };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}
