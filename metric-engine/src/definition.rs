//! FILENAME: metric-engine/src/definition.rs
//! PURPOSE: Plain-data definitions of metric templates, group metrics and groups.
//! CONTEXT: These records are supplied by the persistence collaborator as JSON
//! and carry no behavior beyond a few lookups. A template says *how* to
//! compute; a group metric says *on what* (its slot bindings) inside one group.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::filter::FilterOperator;
use crate::value::CellValue;

// ============================================================================
// METRIC TEMPLATES
// ============================================================================

/// Built-in aggregation applied to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Median,
    Percentile,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT_DISTINCT",
            AggregateFunction::Median => "MEDIAN",
            AggregateFunction::Percentile => "PERCENTILE",
        }
    }
}

/// Whether a template aggregates a column or evaluates a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricKind {
    Aggregate {
        #[serde(rename = "aggregateFunction")]
        function: AggregateFunction,
    },
    Calculated {
        formula: String,
    },
}

/// What a named template slot is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// A source column of the rows.
    Field,
    /// Another metric of the same group.
    Metric,
}

/// A named input of a template, bound per group metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySlot {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SlotKind,
}

impl DependencySlot {
    pub fn field(name: impl Into<String>) -> Self {
        DependencySlot {
            name: name.into(),
            kind: SlotKind::Field,
        }
    }

    pub fn metric(name: impl Into<String>) -> Self {
        DependencySlot {
            name: name.into(),
            kind: SlotKind::Metric,
        }
    }
}

/// How a computed value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    #[default]
    Number,
    Integer,
    Percentage,
    Currency,
}

fn default_decimal_places() -> u8 {
    2
}

/// Reusable metric definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTemplate {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: MetricKind,
    #[serde(default)]
    pub dependencies: Vec<DependencySlot>,
    #[serde(default)]
    pub display_format: DisplayFormat,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u8,
    /// Rank used by `PERCENTILE`, 0..=100. Defaults to the median.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

impl MetricTemplate {
    pub fn aggregate(id: impl Into<String>, function: AggregateFunction, field_slot: &str) -> Self {
        MetricTemplate {
            id: id.into(),
            name: format!("{}({})", function.name(), field_slot),
            kind: MetricKind::Aggregate { function },
            dependencies: vec![DependencySlot::field(field_slot)],
            display_format: DisplayFormat::Number,
            decimal_places: default_decimal_places(),
            percentile: None,
        }
    }

    pub fn calculated(
        id: impl Into<String>,
        formula: impl Into<String>,
        dependencies: Vec<DependencySlot>,
    ) -> Self {
        let formula = formula.into();
        MetricTemplate {
            id: id.into(),
            name: formula.clone(),
            kind: MetricKind::Calculated { formula },
            dependencies,
            display_format: DisplayFormat::Number,
            decimal_places: default_decimal_places(),
            percentile: None,
        }
    }

    pub fn with_format(mut self, format: DisplayFormat, decimal_places: u8) -> Self {
        self.display_format = format;
        self.decimal_places = decimal_places;
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    /// Declared slots of the given kind, in declaration order.
    pub fn slots(&self, kind: SlotKind) -> impl Iterator<Item = &DependencySlot> {
        self.dependencies.iter().filter(move |s| s.kind == kind)
    }
}

// ============================================================================
// GROUPS
// ============================================================================

fn default_enabled() -> bool {
    true
}

/// One template instantiated inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetric {
    pub id: String,
    pub template_id: String,
    /// Display name override; the template name is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Slot name to source column.
    #[serde(default)]
    pub field_bindings: BTreeMap<String, String>,
    /// Slot name to another GroupMetric id of the same group.
    #[serde(default)]
    pub metric_bindings: BTreeMap<String, String>,
    /// UI ordering hint, used only to break ties in evaluation order.
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl GroupMetric {
    pub fn new(id: impl Into<String>, template_id: impl Into<String>, order: i32) -> Self {
        GroupMetric {
            id: id.into(),
            template_id: template_id.into(),
            name: None,
            field_bindings: BTreeMap::new(),
            metric_bindings: BTreeMap::new(),
            order,
            enabled: true,
        }
    }

    pub fn bind_field(mut self, slot: impl Into<String>, column: impl Into<String>) -> Self {
        self.field_bindings.insert(slot.into(), column.into());
        self
    }

    pub fn bind_metric(mut self, slot: impl Into<String>, metric_id: impl Into<String>) -> Self {
        self.metric_bindings.insert(slot.into(), metric_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A column/operator/literal predicate applied to every row of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    pub value: CellValue,
}

impl FilterCondition {
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<CellValue>,
    ) -> Self {
        FilterCondition {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }
}

/// One (level, selected value) pair of a hierarchy path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyFilterValue {
    pub level: String,
    pub value: String,
}

impl HierarchyFilterValue {
    pub fn new(level: impl Into<String>, value: impl Into<String>) -> Self {
        HierarchyFilterValue {
            level: level.into(),
            value: value.into(),
        }
    }
}

/// A named set of metrics computed over one filtered subset of the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    /// Group-scoped hierarchy path. When non-empty it replaces the
    /// dashboard-wide selection for this group.
    #[serde(default)]
    pub hierarchy_filters: Vec<HierarchyFilterValue>,
    #[serde(default)]
    pub metrics: Vec<GroupMetric>,
}

impl IndicatorGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        IndicatorGroup {
            id: id.into(),
            name: name.into(),
            filters: Vec::new(),
            hierarchy_filters: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn with_filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    pub fn with_hierarchy(mut self, level: impl Into<String>, value: impl Into<String>) -> Self {
        self.hierarchy_filters
            .push(HierarchyFilterValue::new(level, value));
        self
    }

    pub fn with_metric(mut self, metric: GroupMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn metric(&self, id: &str) -> Option<&GroupMetric> {
        self.metrics.iter().find(|m| m.id == id)
    }
}

/// Templates indexed by id.
pub type TemplateMap = FxHashMap<String, MetricTemplate>;

/// Builds a template index from a list.
pub fn index_templates<I>(templates: I) -> TemplateMap
where
    I: IntoIterator<Item = MetricTemplate>,
{
    templates.into_iter().map(|t| (t.id.clone(), t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_deserializes_aggregate_kind() {
        let json = r#"{
            "id": "t1",
            "name": "Average price",
            "type": "aggregate",
            "aggregateFunction": "AVG",
            "dependencies": [{"name": "price", "type": "field"}],
            "displayFormat": "currency",
            "decimalPlaces": 1
        }"#;
        let template: MetricTemplate = serde_json::from_str(json).unwrap();

        assert_eq!(
            template.kind,
            MetricKind::Aggregate {
                function: AggregateFunction::Avg
            }
        );
        assert_eq!(template.dependencies, vec![DependencySlot::field("price")]);
        assert_eq!(template.display_format, DisplayFormat::Currency);
        assert_eq!(template.decimal_places, 1);
    }

    #[test]
    fn template_deserializes_calculated_kind_with_defaults() {
        let json = r#"{
            "id": "t2",
            "name": "Share",
            "type": "calculated",
            "formula": "part / whole"
        }"#;
        let template: MetricTemplate = serde_json::from_str(json).unwrap();

        assert_eq!(
            template.kind,
            MetricKind::Calculated {
                formula: "part / whole".into()
            }
        );
        assert!(template.dependencies.is_empty());
        assert_eq!(template.display_format, DisplayFormat::Number);
        assert_eq!(template.decimal_places, 2);
    }

    #[test]
    fn group_metric_defaults_to_enabled() {
        let json = r#"{"id": "m1", "templateId": "t1", "fieldBindings": {"price": "Unit Price"}}"#;
        let metric: GroupMetric = serde_json::from_str(json).unwrap();

        assert!(metric.enabled);
        assert_eq!(metric.order, 0);
        assert_eq!(metric.field_bindings["price"], "Unit Price");
    }

    #[test]
    fn group_deserializes_filters() {
        let json = r#"{
            "id": "g1",
            "name": "North",
            "filters": [{"column": "region", "operator": "=", "value": "North"}],
            "hierarchyFilters": [{"level": "city", "value": "Oslo"}]
        }"#;
        let group: IndicatorGroup = serde_json::from_str(json).unwrap();

        assert_eq!(group.filters[0].operator, FilterOperator::Equal);
        assert_eq!(group.filters[0].value, CellValue::Text("North".into()));
        assert_eq!(group.hierarchy_filters[0].value, "Oslo");
        assert!(group.metrics.is_empty());
    }

    #[test]
    fn slots_filter_by_kind() {
        let template = MetricTemplate::calculated(
            "t",
            "SUM(amount) / base",
            vec![DependencySlot::field("amount"), DependencySlot::metric("base")],
        );

        let metrics: Vec<&str> = template
            .slots(SlotKind::Metric)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(metrics, vec!["base"]);
    }
}
