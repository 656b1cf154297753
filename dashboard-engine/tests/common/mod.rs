//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for dashboard-engine integration tests.

#![allow(dead_code)]

use dashboard_engine::{ComputationContext, Dashboard, IndicatorGroupInDashboard, VirtualMetric};
use metric_engine::{
    index_templates, row, AggregateFunction, CellValue, DependencySlot, DisplayFormat,
    FilterCondition, FilterOperator, GroupMetric, HierarchyContext, IndicatorGroup,
    MetricTemplate, Row, TemplateMap,
};

/// Owns every input of a computation so tests can borrow a context from it.
pub struct TestHarness {
    pub rows: Vec<Row>,
    pub groups: Vec<IndicatorGroup>,
    pub templates: TemplateMap,
    pub dashboard: Dashboard,
    pub hierarchy: HierarchyContext,
}

impl TestHarness {
    /// Sales data with two regions and three groups on one dashboard.
    pub fn with_sales_data() -> Self {
        TestHarness {
            rows: SalesFixture::rows(),
            groups: SalesFixture::groups(),
            templates: SalesFixture::templates(),
            dashboard: SalesFixture::dashboard(),
            hierarchy: HierarchyContext::new(["region", "city"]),
        }
    }

    pub fn ctx(&self) -> ComputationContext<'_> {
        ComputationContext::new(
            &self.rows,
            &self.groups,
            &self.templates,
            &self.dashboard,
            &self.hierarchy,
        )
    }

    pub fn select(&mut self, level: &str, value: &str) {
        let levels = self.hierarchy.levels.clone();
        self.hierarchy.selection.select(&levels, level, value);
    }
}

pub struct SalesFixture;

impl SalesFixture {
    /// (region, city, price, qty)
    pub fn data() -> Vec<(&'static str, &'static str, Option<f64>, f64)> {
        vec![
            ("North", "Oslo", Some(10.0), 1.0),
            ("North", "Bergen", Some(20.0), 3.0),
            ("South", "Rome", Some(999.0), 1.0),
            ("South", "Rome", None, 2.0),
            ("South", "Milan", Some(1.0), 4.0),
        ]
    }

    pub fn rows() -> Vec<Row> {
        Self::data()
            .into_iter()
            .map(|(region, city, price, qty)| {
                row([
                    ("region", CellValue::from(region)),
                    ("city", CellValue::from(city)),
                    ("price", CellValue::from(price)),
                    ("qty", CellValue::from(qty)),
                ])
            })
            .collect()
    }

    pub fn templates() -> TemplateMap {
        index_templates([
            MetricTemplate::aggregate("avg", AggregateFunction::Avg, "value"),
            MetricTemplate::aggregate("count", AggregateFunction::Count, "value")
                .with_format(DisplayFormat::Integer, 0),
            MetricTemplate::calculated(
                "revenue",
                "SUM(p * q)",
                vec![DependencySlot::field("p"), DependencySlot::field("q")],
            ),
            MetricTemplate::calculated(
                "per_unit",
                "rev / SUM(q)",
                vec![DependencySlot::metric("rev"), DependencySlot::field("q")],
            ),
            MetricTemplate::calculated(
                "plus_one",
                "x + 1",
                vec![DependencySlot::metric("x")],
            ),
        ])
    }

    fn region_group(id: &str, name: &str, region: &str) -> IndicatorGroup {
        IndicatorGroup::new(id, name)
            .with_filter(FilterCondition::new("region", FilterOperator::Equal, region))
            .with_metric(GroupMetric::new("avg_price", "avg", 0).bind_field("value", "price"))
            .with_metric(GroupMetric::new("priced", "count", 1).bind_field("value", "price"))
            .with_metric(
                GroupMetric::new("per_unit", "per_unit", 2)
                    .bind_metric("rev", "revenue")
                    .bind_field("q", "qty"),
            )
            .with_metric(
                GroupMetric::new("revenue", "revenue", 3)
                    .bind_field("p", "price")
                    .bind_field("q", "qty"),
            )
    }

    pub fn groups() -> Vec<IndicatorGroup> {
        vec![
            Self::region_group("north", "North", "North"),
            Self::region_group("south", "South", "South"),
            IndicatorGroup::new("loop", "Loop")
                .with_metric(GroupMetric::new("x", "plus_one", 0).bind_metric("x", "y"))
                .with_metric(GroupMetric::new("y", "plus_one", 1).bind_metric("x", "x")),
        ]
    }

    pub fn dashboard() -> Dashboard {
        Dashboard::new("sales", "Sales by region")
            .with_virtual_metric(VirtualMetric::new("vm_avg", "Average price", 0))
            .with_virtual_metric(
                VirtualMetric::new("vm_count", "Priced rows", 1).with_format(DisplayFormat::Integer, 0),
            )
            .with_virtual_metric(VirtualMetric::new("vm_unit", "Revenue per unit", 2))
            .with_virtual_metric(VirtualMetric::new("vm_extra", "Unbound", 3))
            .with_group(
                IndicatorGroupInDashboard::new("north", 0)
                    .bind("vm_avg", "avg_price")
                    .bind("vm_count", "priced")
                    .bind("vm_unit", "per_unit"),
            )
            .with_group(
                IndicatorGroupInDashboard::new("south", 1)
                    .bind("vm_avg", "avg_price")
                    .bind("vm_count", "priced"),
            )
            .with_group(IndicatorGroupInDashboard::new("loop", 2).bind("vm_avg", "x"))
    }
}
