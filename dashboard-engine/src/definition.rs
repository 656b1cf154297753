//! FILENAME: dashboard-engine/src/definition.rs
//! Dashboard Definition - Serializable configuration (what the dashboard IS).
//!
//! A dashboard is a table: one row per indicator group, one column per
//! virtual metric. Virtual metrics carry no formula; each group row binds
//! every column to one of its own metrics, or leaves it unbound.

use std::collections::BTreeMap;

use metric_engine::{DisplayFormat, FilterOperator};
use serde::{Deserialize, Serialize};

pub type DashboardId = String;
pub type GroupId = String;
pub type VirtualMetricId = String;

// ============================================================================
// VIRTUAL METRICS
// ============================================================================

/// Conditional color for a cell, evaluated on its numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRule {
    pub operator: FilterOperator,
    pub threshold: f64,
    pub color: String,
}

impl ColorRule {
    pub fn new(operator: FilterOperator, threshold: f64, color: impl Into<String>) -> Self {
        ColorRule {
            operator,
            threshold,
            color: color.into(),
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        match self.operator {
            FilterOperator::Equal => value == self.threshold,
            FilterOperator::NotEqual => value != self.threshold,
            FilterOperator::GreaterThan => value > self.threshold,
            FilterOperator::LessThan => value < self.threshold,
            FilterOperator::GreaterOrEqual => value >= self.threshold,
            FilterOperator::LessOrEqual => value <= self.threshold,
            FilterOperator::Contains | FilterOperator::Unknown(_) => false,
        }
    }
}

fn default_decimal_places() -> u8 {
    2
}

/// A dashboard-wide abstract column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMetric {
    pub id: VirtualMetricId,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub display_format: DisplayFormat,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u8,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub color_rules: Vec<ColorRule>,
}

impl VirtualMetric {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order: i32) -> Self {
        VirtualMetric {
            id: id.into(),
            name: name.into(),
            unit: None,
            display_format: DisplayFormat::Number,
            decimal_places: default_decimal_places(),
            order,
            color_rules: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: DisplayFormat, decimal_places: u8) -> Self {
        self.display_format = format;
        self.decimal_places = decimal_places;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_color_rule(mut self, rule: ColorRule) -> Self {
        self.color_rules.push(rule);
        self
    }

    /// First matching rule wins.
    pub fn color_for(&self, value: f64) -> Option<&str> {
        self.color_rules
            .iter()
            .find(|r| r.matches(value))
            .map(|r| r.color.as_str())
    }
}

// ============================================================================
// GROUP PLACEMENT
// ============================================================================

/// Which group metric answers a virtual metric column for one group row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMetricBinding {
    pub virtual_metric_id: VirtualMetricId,
    pub metric_id: String,
}

fn default_enabled() -> bool {
    true
}

/// An indicator group placed on a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorGroupInDashboard {
    pub group_id: GroupId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub bindings: Vec<VirtualMetricBinding>,
}

impl IndicatorGroupInDashboard {
    pub fn new(group_id: impl Into<String>, order: i32) -> Self {
        IndicatorGroupInDashboard {
            group_id: group_id.into(),
            enabled: true,
            order,
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, virtual_metric_id: impl Into<String>, metric_id: impl Into<String>) -> Self {
        let virtual_metric_id = virtual_metric_id.into();
        // One binding per column; rebinding replaces
        self.bindings.retain(|b| b.virtual_metric_id != virtual_metric_id);
        self.bindings.push(VirtualMetricBinding {
            virtual_metric_id,
            metric_id: metric_id.into(),
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Bound metric id for a virtual metric, if any.
    pub fn binding_for(&self, virtual_metric_id: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.virtual_metric_id == virtual_metric_id)
            .map(|b| b.metric_id.as_str())
    }
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub id: DashboardId,
    pub name: String,
    #[serde(default)]
    pub virtual_metrics: Vec<VirtualMetric>,
    #[serde(default)]
    pub groups: Vec<IndicatorGroupInDashboard>,
}

impl Dashboard {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Dashboard {
            id: id.into(),
            name: name.into(),
            virtual_metrics: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_virtual_metric(mut self, metric: VirtualMetric) -> Self {
        self.virtual_metrics.push(metric);
        self
    }

    pub fn with_group(mut self, group: IndicatorGroupInDashboard) -> Self {
        self.groups.push(group);
        self
    }

    /// Virtual metric columns in display order (by `order`, then position).
    pub fn ordered_virtual_metrics(&self) -> Vec<&VirtualMetric> {
        let mut columns: Vec<&VirtualMetric> = self.virtual_metrics.iter().collect();
        columns.sort_by_key(|v| v.order);
        columns
    }

    /// Enabled group placements in display order (by `order`, then position).
    pub fn ordered_groups(&self) -> Vec<&IndicatorGroupInDashboard> {
        let mut groups: Vec<&IndicatorGroupInDashboard> =
            self.groups.iter().filter(|g| g.enabled).collect();
        groups.sort_by_key(|g| g.order);
        groups
    }

    /// Metric ids bound per virtual metric across groups, for diagnostics.
    pub fn binding_matrix(&self) -> BTreeMap<&str, Vec<(&str, &str)>> {
        let mut matrix: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
        for group in &self.groups {
            for binding in &group.bindings {
                matrix
                    .entry(binding.virtual_metric_id.as_str())
                    .or_default()
                    .push((group.group_id.as_str(), binding.metric_id.as_str()));
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_color_rule_wins() {
        let vm = VirtualMetric::new("vm", "Margin", 0)
            .with_color_rule(ColorRule::new(FilterOperator::LessThan, 0.0, "red"))
            .with_color_rule(ColorRule::new(FilterOperator::LessThan, 10.0, "amber"))
            .with_color_rule(ColorRule::new(FilterOperator::GreaterOrEqual, 10.0, "green"));

        assert_eq!(vm.color_for(-5.0), Some("red"));
        assert_eq!(vm.color_for(5.0), Some("amber"));
        assert_eq!(vm.color_for(10.0), Some("green"));
    }

    #[test]
    fn ordering_is_stable_and_skips_disabled_groups() {
        let dashboard = Dashboard::new("d", "D")
            .with_virtual_metric(VirtualMetric::new("b", "B", 1))
            .with_virtual_metric(VirtualMetric::new("a", "A", 0))
            .with_virtual_metric(VirtualMetric::new("c", "C", 1))
            .with_group(IndicatorGroupInDashboard::new("g2", 2))
            .with_group(IndicatorGroupInDashboard::new("g1", 1))
            .with_group(IndicatorGroupInDashboard::new("g0", 0).disabled());

        let columns: Vec<&str> = dashboard
            .ordered_virtual_metrics()
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(columns, vec!["a", "b", "c"]);

        let groups: Vec<&str> = dashboard
            .ordered_groups()
            .iter()
            .map(|g| g.group_id.as_str())
            .collect();
        assert_eq!(groups, vec!["g1", "g2"]);
    }

    #[test]
    fn rebinding_replaces_previous_binding() {
        let placement = IndicatorGroupInDashboard::new("g", 0)
            .bind("vm", "m1")
            .bind("vm", "m2");

        assert_eq!(placement.bindings.len(), 1);
        assert_eq!(placement.binding_for("vm"), Some("m2"));
        assert_eq!(placement.binding_for("other"), None);
    }

    #[test]
    fn dashboard_deserializes_from_json() {
        let json = r#"{
            "id": "d1",
            "name": "Regions",
            "virtualMetrics": [{"id": "vm1", "name": "Avg price", "displayFormat": "currency",
                "colorRules": [{"operator": ">", "threshold": 100, "color": "green"}]}],
            "groups": [{"groupId": "north", "bindings": [{"virtualMetricId": "vm1", "metricId": "avg_price"}]}]
        }"#;
        let dashboard: Dashboard = serde_json::from_str(json).unwrap();

        assert_eq!(dashboard.virtual_metrics[0].display_format, DisplayFormat::Currency);
        assert_eq!(dashboard.virtual_metrics[0].decimal_places, 2);
        assert!(dashboard.groups[0].enabled);
        assert_eq!(dashboard.groups[0].binding_for("vm1"), Some("avg_price"));
        assert_eq!(dashboard.binding_matrix()["vm1"], vec![("north", "avg_price")]);
    }
}
