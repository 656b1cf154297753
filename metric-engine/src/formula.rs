//! FILENAME: metric-engine/src/formula.rs
//! PURPOSE: Evaluates a metric formula over a row subset.
//! CONTEXT: A formula such as `SUM(revenue) / orders` mixes two kinds of
//! names. Field names stand for a per-row numeric series built from the
//! rows; metric names stand for the scalar result of a metric computed
//! earlier in the group. Reducers collapse series into scalars.
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ with standard precedence and unary minus
//! - Reducers: SUM, AVG, COUNT, MIN, MAX over one or more arguments
//! - Element-wise arithmetic between series of the same row subset
//! - Slot aliases: a template slot name resolving to a bound column
//!
//! The evaluator never fails its caller. Parse errors, unknown metrics,
//! division by zero and non-finite results yield 0 plus an
//! `INVALID_FORMULA` error; unknown columns yield an empty series plus a
//! `COLUMN_NOT_FOUND` warning.

use formula_parser::{
    parse, referenced_fields, BinaryOperator, Expression, Reducer, Symbols, UnaryOperator,
};
use rustc_hash::FxHashMap;

use crate::aggregate::evaluate_aggregate;
use crate::definition::AggregateFunction;
use crate::error::EngineError;
use crate::logging::FORMULA;
use crate::value::Row;
use crate::{log_debug, log_warn};

/// Named values visible to a formula besides raw columns.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Metric slot or metric id -> already computed scalar.
    metrics: FxHashMap<String, f64>,
    /// Field slot -> source column.
    aliases: FxHashMap<String, String>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert_metric(name, value);
        self
    }

    pub fn with_alias(mut self, slot: impl Into<String>, column: impl Into<String>) -> Self {
        self.insert_alias(slot, column);
        self
    }

    pub fn insert_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    pub fn insert_alias(&mut self, slot: impl Into<String>, column: impl Into<String>) {
        self.aliases.insert(slot.into(), column.into());
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Column a field name reads from: the bound column for a slot, or the
    /// name itself.
    pub fn column_for<'s>(&'s self, name: &'s str) -> &'s str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    fn symbols(&self, available_fields: &[String]) -> Symbols {
        let mut metric_names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        metric_names.sort_unstable();
        let mut alias_names: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        alias_names.sort_unstable();

        Symbols::new()
            .with_fields(available_fields.iter().map(String::as_str))
            .with_fields(alias_names)
            .with_metrics(metric_names)
    }
}

/// Result of evaluating one formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOutcome {
    pub value: f64,
    /// Fatal formula errors and non-fatal column warnings, in discovery order.
    pub errors: Vec<EngineError>,
}

impl FormulaOutcome {
    fn failed(error: EngineError, warnings: Vec<EngineError>) -> Self {
        let mut errors = warnings;
        errors.push(error);
        FormulaOutcome { value: 0.0, errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// All error messages joined for display, if any.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(
                self.errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }
}

/// Intermediate evaluation result.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Scalar(f64),
    /// One entry per row of the subset; `None` for null or non-numeric cells.
    Series(Vec<Option<f64>>),
}

/// Evaluates formulas against one row subset.
pub struct FormulaEvaluator<'a> {
    rows: &'a [&'a Row],
    available_fields: &'a [String],
    scope: &'a Scope,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(rows: &'a [&'a Row], available_fields: &'a [String], scope: &'a Scope) -> Self {
        FormulaEvaluator {
            rows,
            available_fields,
            scope,
        }
    }

    /// Parses and evaluates a formula. Never panics and never returns `Err`.
    pub fn evaluate(&self, formula: &str) -> FormulaOutcome {
        let symbols = self.scope.symbols(self.available_fields);

        let expr = match parse(formula, &symbols) {
            Ok(expr) => expr,
            Err(e) => {
                log_warn!(FORMULA, "parse failed formula='{}': {}", formula, e.message);
                return FormulaOutcome::failed(EngineError::InvalidFormula(e.message), Vec::new());
            }
        };

        self.evaluate_expression(&expr)
    }

    /// Evaluates an already parsed expression.
    pub fn evaluate_expression(&self, expr: &Expression) -> FormulaOutcome {
        let (series, warnings) = self.build_series(expr);

        let result = self
            .eval(expr, &series)
            .and_then(|operand| match operand {
                Operand::Scalar(v) => Ok(v),
                Operand::Series(_) => Err(EngineError::InvalidFormula(
                    "fields must be reduced with SUM, AVG, COUNT, MIN or MAX".to_string(),
                )),
            });

        match result {
            Ok(value) => {
                log_debug!(FORMULA, "evaluated {} = {}", expr, value);
                FormulaOutcome {
                    value,
                    errors: warnings,
                }
            }
            Err(err) => {
                log_warn!(FORMULA, "evaluation failed {}: {}", expr, err);
                FormulaOutcome::failed(err, warnings)
            }
        }
    }

    /// Builds a series only for the fields the expression references.
    fn build_series(&self, expr: &Expression) -> (FxHashMap<String, Vec<Option<f64>>>, Vec<EngineError>) {
        let mut series = FxHashMap::default();
        let mut warnings = Vec::new();

        for name in referenced_fields(expr) {
            let column = self.scope.column_for(&name);
            let values: Vec<Option<f64>> = if self.available_fields.iter().any(|f| f == column) {
                self.rows
                    .iter()
                    .map(|r| r.get(column).and_then(|c| c.as_number()))
                    .collect()
            } else {
                warnings.push(EngineError::ColumnNotFound(column.to_string()));
                vec![None; self.rows.len()]
            };
            series.insert(name, values);
        }

        (series, warnings)
    }

    fn eval(
        &self,
        expr: &Expression,
        series: &FxHashMap<String, Vec<Option<f64>>>,
    ) -> Result<Operand, EngineError> {
        match expr {
            Expression::Number(n) => Ok(Operand::Scalar(*n)),
            Expression::Field(name) => Ok(Operand::Series(
                series
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| vec![None; self.rows.len()]),
            )),
            Expression::Metric(name) => self
                .scope
                .metric(name)
                .map(Operand::Scalar)
                .ok_or_else(|| EngineError::InvalidFormula(format!("Unknown metric: {}", name))),
            Expression::Call { func, args } => {
                let mut values = Vec::new();
                for arg in args {
                    match self.eval(arg, series)? {
                        Operand::Scalar(v) => values.push(v),
                        Operand::Series(items) => values.extend(items.into_iter().flatten()),
                    }
                }
                let reduced = evaluate_aggregate(reducer_function(*func), &values, None);
                if !reduced.is_finite() {
                    return Err(EngineError::InvalidFormula(format!(
                        "Result of {} is not a finite number",
                        func
                    )));
                }
                Ok(Operand::Scalar(reduced))
            }
            Expression::BinaryOp { left, op, right } => {
                let l = self.eval(left, series)?;
                let r = self.eval(right, series)?;
                apply_binary(*op, l, r)
            }
            Expression::UnaryOp { op, operand } => {
                let value = self.eval(operand, series)?;
                Ok(match op {
                    UnaryOperator::Plus => value,
                    UnaryOperator::Negate => match value {
                        Operand::Scalar(v) => Operand::Scalar(-v),
                        Operand::Series(items) => {
                            Operand::Series(items.into_iter().map(|v| v.map(|x| -x)).collect())
                        }
                    },
                })
            }
        }
    }
}

/// Evaluates a formula string over a row subset.
pub fn evaluate_formula(
    formula: &str,
    rows: &[&Row],
    available_fields: &[String],
    scope: &Scope,
) -> FormulaOutcome {
    FormulaEvaluator::new(rows, available_fields, scope).evaluate(formula)
}

fn reducer_function(reducer: Reducer) -> AggregateFunction {
    match reducer {
        Reducer::Sum => AggregateFunction::Sum,
        Reducer::Avg => AggregateFunction::Avg,
        Reducer::Count => AggregateFunction::Count,
        Reducer::Min => AggregateFunction::Min,
        Reducer::Max => AggregateFunction::Max,
    }
}

fn arithmetic(op: BinaryOperator, a: f64, b: f64) -> f64 {
    match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Power => a.powf(b),
    }
}

fn apply_binary(op: BinaryOperator, left: Operand, right: Operand) -> Result<Operand, EngineError> {
    match (left, right) {
        (Operand::Scalar(a), Operand::Scalar(b)) => {
            if op == BinaryOperator::Divide && b == 0.0 {
                return Err(EngineError::InvalidFormula("Division by zero".to_string()));
            }
            let v = arithmetic(op, a, b);
            if v.is_finite() {
                Ok(Operand::Scalar(v))
            } else {
                Err(EngineError::InvalidFormula(format!(
                    "Result of {} {} {} is not a finite number",
                    a,
                    op_symbol(op),
                    b
                )))
            }
        }
        (Operand::Series(xs), Operand::Scalar(b)) => Ok(Operand::Series(
            xs.into_iter().map(|x| element(op, x, Some(b))).collect(),
        )),
        (Operand::Scalar(a), Operand::Series(ys)) => Ok(Operand::Series(
            ys.into_iter().map(|y| element(op, Some(a), y)).collect(),
        )),
        (Operand::Series(xs), Operand::Series(ys)) => Ok(Operand::Series(
            xs.into_iter()
                .zip(ys)
                .map(|(x, y)| element(op, x, y))
                .collect(),
        )),
    }
}

/// Per-row arithmetic; missing inputs and non-finite results drop the row.
fn element(op: BinaryOperator, a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let v = arithmetic(op, a?, b?);
    v.is_finite().then_some(v)
}

fn op_symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Power => "^",
    }
}
