//! FILENAME: formula-parser/src/visit.rs
//! PURPOSE: Extracts the names an expression depends on.
//! CONTEXT: The evaluator only builds vectors for fields a formula actually
//! uses. Formula editors use the metric list to show which metric slots a
//! formula reads.

use crate::ast::Expression;

/// Field names referenced by the expression, in first-occurrence order.
pub fn referenced_fields(expr: &Expression) -> Vec<String> {
    let mut out = Vec::new();
    collect(expr, &mut out, field_name);
    out
}

/// Metric names referenced by the expression, in first-occurrence order.
pub fn referenced_metrics(expr: &Expression) -> Vec<String> {
    let mut out = Vec::new();
    collect(expr, &mut out, metric_name);
    out
}

fn field_name(expr: &Expression) -> Option<&String> {
    match expr {
        Expression::Field(name) => Some(name),
        _ => None,
    }
}

fn metric_name(expr: &Expression) -> Option<&String> {
    match expr {
        Expression::Metric(name) => Some(name),
        _ => None,
    }
}

fn collect(expr: &Expression, out: &mut Vec<String>, pick: fn(&Expression) -> Option<&String>) {
    if let Some(name) = pick(expr) {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }

    match expr {
        Expression::Call { args, .. } => {
            for arg in args {
                collect(arg, out, pick);
            }
        }
        Expression::BinaryOp { left, right, .. } => {
            collect(left, out, pick);
            collect(right, out, pick);
        }
        Expression::UnaryOp { operand, .. } => collect(operand, out, pick),
        Expression::Number(_) | Expression::Field(_) | Expression::Metric(_) => {}
    }
}
