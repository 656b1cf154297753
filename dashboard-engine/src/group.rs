//! FILENAME: dashboard-engine/src/group.rs
//! Group Engine - Computes every metric of one indicator group.
//!
//! Pipeline per group:
//! 1. Effective filter: the group's own hierarchy path (or the dashboard's
//!    active level) plus the group's filter conditions
//! 2. Filter the rows
//! 3. Resolve the evaluation order of the enabled metrics
//! 4. Evaluate each metric in order, feeding results to later metrics
//! 5. Format each value
//!
//! A cycle fails the whole group: no metric is evaluated and every value is
//! null. Other failures are confined to the metric (and its dependents).

use metric_engine::logging::GROUP;
use metric_engine::{
    aggregate_column, filter_rows, missing_columns, AggregateFunction, DependencyResolver,
    EngineConfig, EngineError, ErrorCode, FilterCondition, FormulaEvaluator, GroupMetric,
    HierarchyContext, IndicatorGroup, MetricKind, MetricTemplate, Row, Scope, SlotKind,
    TemplateMap,
};
use metric_engine::{log_debug, log_warn};
use rustc_hash::FxHashMap;

use crate::context::ComputationContext;
use crate::result::{ComputedMetricValue, ResultError};

/// All metric values of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupComputation {
    pub group_id: String,
    pub group_name: String,
    /// One value per enabled metric, in evaluation order.
    pub values: Vec<ComputedMetricValue>,
    /// Rows that passed the group's filters.
    pub record_count: usize,
    /// Group-fatal error; when set every value is null.
    pub error: Option<EngineError>,
    /// Non-fatal group notes (filter columns absent from the data).
    pub warnings: Vec<EngineError>,
    pub computed_at: i64,
}

impl GroupComputation {
    pub fn value(&self, metric_id: &str) -> Option<&ComputedMetricValue> {
        self.values.iter().find(|v| v.metric_id == metric_id)
    }

    /// Rebuilds a computation from cached metric values.
    pub fn from_cached(
        group: &IndicatorGroup,
        values: Vec<ComputedMetricValue>,
        warnings: Vec<EngineError>,
        now: i64,
    ) -> Self {
        let record_count = values.first().map(|v| v.record_count).unwrap_or(0);
        GroupComputation {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            values,
            record_count,
            error: None,
            warnings,
            computed_at: now,
        }
    }
}

/// The conditions a group's rows must satisfy: the hierarchy condition (if
/// any) followed by the group's own filters.
pub fn effective_conditions(group: &IndicatorGroup, hierarchy: &HierarchyContext) -> Vec<FilterCondition> {
    let mut conditions = Vec::with_capacity(group.filters.len() + 1);
    if let Some(active) = hierarchy.effective_filter(&group.hierarchy_filters) {
        conditions.push(active.to_condition());
    }
    conditions.extend(group.filters.iter().cloned());
    conditions
}

/// Non-fatal notes for a group's filters.
pub fn filter_warnings(rows: &[Row], conditions: &[FilterCondition]) -> Vec<EngineError> {
    missing_columns(rows, conditions)
        .into_iter()
        .map(EngineError::ColumnNotFound)
        .collect()
}

/// Computes one group over `rows`.
pub fn compute_group(
    group: &IndicatorGroup,
    templates: &TemplateMap,
    rows: &[Row],
    hierarchy: &HierarchyContext,
    config: &EngineConfig,
    now: i64,
) -> GroupComputation {
    let columns = metric_engine::column_names(rows);
    GroupEngine {
        group,
        templates,
        rows,
        columns: &columns,
        hierarchy,
        config,
        now,
    }
    .run()
}

/// Computes one group using the context's precomputed column list.
pub fn compute_group_in(
    ctx: &ComputationContext<'_>,
    group: &IndicatorGroup,
    config: &EngineConfig,
    now: i64,
) -> GroupComputation {
    GroupEngine {
        group,
        templates: ctx.templates,
        rows: ctx.rows,
        columns: &ctx.columns,
        hierarchy: ctx.hierarchy,
        config,
        now,
    }
    .run()
}

struct GroupEngine<'a> {
    group: &'a IndicatorGroup,
    templates: &'a TemplateMap,
    rows: &'a [Row],
    columns: &'a [String],
    hierarchy: &'a HierarchyContext,
    config: &'a EngineConfig,
    now: i64,
}

impl<'a> GroupEngine<'a> {
    fn run(&self) -> GroupComputation {
        let group = self.group;
        let conditions = effective_conditions(group, self.hierarchy);
        let warnings = filter_warnings(self.rows, &conditions);
        for w in &warnings {
            log_warn!(GROUP, "group {}: {}", group.id, w);
        }

        let subset = filter_rows(self.rows, &conditions, self.config.unknown_operator);
        let record_count = subset.len();

        let plan = match DependencyResolver::new().resolve(group, self.templates) {
            Ok(plan) => plan,
            Err(cycle) => {
                let error = EngineError::from(cycle);
                log_warn!(GROUP, "group {} not computed: {}", group.id, error);
                let values = group
                    .metrics
                    .iter()
                    .filter(|m| m.enabled)
                    .map(|m| self.null_value(m, record_count, &error))
                    .collect();
                return GroupComputation {
                    group_id: group.id.clone(),
                    group_name: group.name.clone(),
                    values,
                    record_count,
                    error: Some(error),
                    warnings,
                    computed_at: self.now,
                };
            }
        };

        // Metric id -> computed scalar, for metric slots of later metrics
        let mut computed: FxHashMap<&str, f64> = FxHashMap::default();
        let mut values = Vec::with_capacity(plan.order.len());

        for id in &plan.order {
            let Some(metric) = group.metric(id) else {
                continue;
            };

            if let Some(err) = plan.failure(id) {
                values.push(self.null_value(metric, record_count, err));
                continue;
            }

            // Templates of non-failed metrics exist; the resolver checked them
            let Some(template) = self.templates.get(&metric.template_id) else {
                let err = EngineError::TemplateNotFound(metric.template_id.clone());
                values.push(self.null_value(metric, record_count, &err));
                continue;
            };

            let (value, errors) = self.evaluate_metric(metric, template, &subset, &computed);
            computed.insert(metric.id.as_str(), value);

            log_debug!(
                GROUP,
                "group {} metric {} = {} (rows={}, errors={})",
                group.id,
                metric.id,
                value,
                record_count,
                errors.len()
            );

            values.push(ComputedMetricValue {
                metric_id: metric.id.clone(),
                group_id: group.id.clone(),
                value: Some(value),
                formatted_value: self.config.formatter().format(
                    value,
                    template.display_format,
                    template.decimal_places,
                ),
                record_count,
                computed_at: self.now,
                error: primary_error(&errors).map(ResultError::from),
            });
        }

        GroupComputation {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            values,
            record_count,
            error: None,
            warnings,
            computed_at: self.now,
        }
    }

    fn evaluate_metric(
        &self,
        metric: &GroupMetric,
        template: &MetricTemplate,
        subset: &[&Row],
        computed: &FxHashMap<&str, f64>,
    ) -> (f64, Vec<EngineError>) {
        match &template.kind {
            MetricKind::Aggregate { function } => {
                self.evaluate_aggregate(metric, template, *function, subset)
            }
            MetricKind::Calculated { formula } => {
                let mut scope = Scope::new();
                for (slot, column) in &metric.field_bindings {
                    scope.insert_alias(slot.as_str(), column.as_str());
                }
                for (slot, target) in &metric.metric_bindings {
                    if let Some(v) = computed.get(target.as_str()) {
                        scope.insert_metric(slot.as_str(), *v);
                    }
                }
                let outcome = FormulaEvaluator::new(subset, self.columns, &scope).evaluate(formula);
                (outcome.value, outcome.errors)
            }
        }
    }

    /// Applies the template's function to the column bound to its first
    /// field slot. `COUNT` without a field slot counts rows.
    fn evaluate_aggregate(
        &self,
        metric: &GroupMetric,
        template: &MetricTemplate,
        function: AggregateFunction,
        subset: &[&Row],
    ) -> (f64, Vec<EngineError>) {
        let Some(slot) = template.slots(SlotKind::Field).next() else {
            if function == AggregateFunction::Count {
                return (subset.len() as f64, Vec::new());
            }
            return (
                0.0,
                vec![EngineError::InvalidFormula(format!(
                    "{} requires a field slot",
                    function.name()
                ))],
            );
        };

        let column = metric
            .field_bindings
            .get(&slot.name)
            .map(String::as_str)
            .unwrap_or(slot.name.as_str());

        let mut errors = Vec::new();
        if !self.columns.iter().any(|c| c == column) {
            errors.push(EngineError::ColumnNotFound(column.to_string()));
        }

        let value = aggregate_column(function, subset, column, template.percentile);
        if !value.is_finite() {
            errors.insert(
                0,
                EngineError::InvalidFormula(format!(
                    "{} of {} is not a finite number",
                    function.name(),
                    column
                )),
            );
            return (0.0, errors);
        }
        (value, errors)
    }

    fn null_value(&self, metric: &GroupMetric, record_count: usize, err: &EngineError) -> ComputedMetricValue {
        ComputedMetricValue {
            metric_id: metric.id.clone(),
            group_id: self.group.id.clone(),
            value: None,
            formatted_value: self.config.null_display.clone(),
            record_count,
            computed_at: self.now,
            error: Some(ResultError::from(err)),
        }
    }
}

/// The error shown for a value: a formula failure outranks column warnings.
fn primary_error(errors: &[EngineError]) -> Option<&EngineError> {
    errors
        .iter()
        .find(|e| e.code() == ErrorCode::InvalidFormula)
        .or_else(|| errors.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric_engine::{
        index_templates, row, CellValue, DependencySlot, DisplayFormat, FilterOperator,
    };

    fn rows() -> Vec<Row> {
        vec![
            row([("region", CellValue::from("North")), ("city", CellValue::from("Oslo")), ("price", CellValue::from(10.0))]),
            row([("region", CellValue::from("North")), ("city", CellValue::from("Bergen")), ("price", CellValue::from(20.0))]),
            row([("region", CellValue::from("South")), ("city", CellValue::from("Rome")), ("price", CellValue::from(999.0))]),
        ]
    }

    fn templates() -> TemplateMap {
        index_templates([
            MetricTemplate::aggregate("avg", AggregateFunction::Avg, "value"),
            MetricTemplate::aggregate("sum", AggregateFunction::Sum, "value"),
            MetricTemplate::calculated("share", "part / whole * 100", vec![
                DependencySlot::metric("part"),
                DependencySlot::metric("whole"),
            ])
            .with_format(DisplayFormat::Number, 1),
            MetricTemplate::calculated("loop", "x + 1", vec![DependencySlot::metric("x")]),
            MetricTemplate {
                dependencies: Vec::new(),
                ..MetricTemplate::aggregate("rows", AggregateFunction::Count, "unused")
            },
        ])
    }

    fn north() -> IndicatorGroup {
        IndicatorGroup::new("north", "North")
            .with_filter(FilterCondition::new("region", FilterOperator::Equal, "North"))
            .with_metric(GroupMetric::new("avg_price", "avg", 0).bind_field("value", "price"))
    }

    fn compute(group: &IndicatorGroup, hierarchy: &HierarchyContext) -> GroupComputation {
        compute_group(group, &templates(), &rows(), hierarchy, &EngineConfig::default(), 1_000)
    }

    #[test]
    fn north_average_over_filtered_rows() {
        let result = compute(&north(), &HierarchyContext::default());

        assert_eq!(result.record_count, 2);
        let avg = result.value("avg_price").unwrap();
        assert_eq!(avg.value, Some(15.0));
        assert_eq!(avg.formatted_value, "15.00");
        assert_eq!(avg.record_count, 2);
        assert!(avg.error.is_none());
    }

    #[test]
    fn later_metrics_see_earlier_results() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(
                GroupMetric::new("share", "share", 0)
                    .bind_metric("part", "north_sum")
                    .bind_metric("whole", "total"),
            )
            .with_metric(GroupMetric::new("total", "sum", 1).bind_field("value", "price"))
            .with_metric(GroupMetric::new("north_sum", "sum", 2).bind_field("value", "price"));

        let result = compute(&group, &HierarchyContext::default());
        let share = result.value("share").unwrap();
        assert_eq!(share.value, Some(100.0));
        assert_eq!(result.values.last().unwrap().metric_id, "share");
    }

    #[test]
    fn cycle_fails_group_with_null_values() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(GroupMetric::new("x", "loop", 0).bind_metric("x", "y"))
            .with_metric(GroupMetric::new("y", "loop", 1).bind_metric("x", "x"));

        let result = compute(&group, &HierarchyContext::default());
        assert_eq!(result.error.as_ref().map(|e| e.code()), Some(ErrorCode::CircularDependency));
        assert_eq!(result.values.len(), 2);
        assert!(result.values.iter().all(|v| v.value.is_none() && v.formatted_value == "-"));
    }

    #[test]
    fn dashboard_hierarchy_narrows_rows() {
        let hierarchy = HierarchyContext::new(["region", "city"])
            .select("region", "North")
            .select("city", "Bergen");
        let group = IndicatorGroup::new("all", "All")
            .with_metric(GroupMetric::new("avg_price", "avg", 0).bind_field("value", "price"));

        let result = compute(&group, &hierarchy);
        assert_eq!(result.record_count, 1);
        assert_eq!(result.value("avg_price").unwrap().value, Some(20.0));
    }

    #[test]
    fn group_hierarchy_overrides_dashboard_selection() {
        let hierarchy = HierarchyContext::new(["region", "city"]).select("region", "North");
        let group = IndicatorGroup::new("south", "South")
            .with_hierarchy("region", "South")
            .with_metric(GroupMetric::new("avg_price", "avg", 0).bind_field("value", "price"));

        let result = compute(&group, &hierarchy);
        assert_eq!(result.value("avg_price").unwrap().value, Some(999.0));
    }

    #[test]
    fn missing_column_keeps_zero_value_with_warning() {
        let group = IndicatorGroup::new("g", "G")
            .with_filter(FilterCondition::new("country", FilterOperator::NotEqual, "x"))
            .with_metric(GroupMetric::new("m", "sum", 0).bind_field("value", "cost"));

        let result = compute(&group, &HierarchyContext::default());
        assert_eq!(result.record_count, 0);
        assert_eq!(result.warnings, vec![EngineError::ColumnNotFound("country".into())]);

        let m = result.value("m").unwrap();
        assert_eq!(m.value, Some(0.0));
        assert_eq!(m.error.as_ref().unwrap().code, ErrorCode::ColumnNotFound);
    }

    #[test]
    fn overflowing_aggregate_is_zero_with_error() {
        let rows = vec![
            row([("price", CellValue::from(1e308))]),
            row([("price", CellValue::from(1e308))]),
        ];
        let group = IndicatorGroup::new("g", "G")
            .with_metric(GroupMetric::new("total", "sum", 0).bind_field("value", "price"));

        let result = compute_group(&group, &templates(), &rows, &HierarchyContext::default(), &EngineConfig::default(), 0);
        let total = result.value("total").unwrap();
        assert_eq!(total.value, Some(0.0));
        assert_eq!(total.formatted_value, "0.00");
        assert_eq!(total.error.as_ref().unwrap().code, ErrorCode::InvalidFormula);
    }

    #[test]
    fn count_without_field_slot_counts_rows() {
        let group = north().with_metric(GroupMetric::new("n", "rows", 1));
        let result = compute(&group, &HierarchyContext::default());
        assert_eq!(result.value("n").unwrap().value, Some(2.0));
    }

    #[test]
    fn disabled_metrics_are_skipped() {
        let group = north().with_metric(
            GroupMetric::new("off", "sum", 1)
                .bind_field("value", "price")
                .disabled(),
        );
        let result = compute(&group, &HierarchyContext::default());
        assert!(result.value("off").is_none());
        assert_eq!(result.values.len(), 1);
    }

    #[test]
    fn recomputation_is_deterministic() {
        let a = compute(&north(), &HierarchyContext::default());
        let b = compute(&north(), &HierarchyContext::default());
        assert_eq!(a, b);
    }
}
