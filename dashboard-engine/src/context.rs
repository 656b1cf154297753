//! FILENAME: dashboard-engine/src/context.rs
//! PURPOSE: The explicit input of one dashboard computation.
//! CONTEXT: Everything a recalculation reads is passed in here; the engine
//! holds no global store of rows or definitions. Identical contexts always
//! produce identical results.

use metric_engine::{HierarchyContext, IndicatorGroup, Row, TemplateMap};
use rustc_hash::FxHashMap;

use crate::definition::Dashboard;

/// Borrowed inputs for one recalculation.
#[derive(Debug, Clone)]
pub struct ComputationContext<'a> {
    pub rows: &'a [Row],
    pub groups: FxHashMap<&'a str, &'a IndicatorGroup>,
    pub templates: &'a TemplateMap,
    pub dashboard: &'a Dashboard,
    pub hierarchy: &'a HierarchyContext,
    /// Every column present in the data, sorted.
    pub columns: Vec<String>,
}

impl<'a> ComputationContext<'a> {
    pub fn new(
        rows: &'a [Row],
        groups: &'a [IndicatorGroup],
        templates: &'a TemplateMap,
        dashboard: &'a Dashboard,
        hierarchy: &'a HierarchyContext,
    ) -> Self {
        ComputationContext {
            rows,
            groups: groups.iter().map(|g| (g.id.as_str(), g)).collect(),
            templates,
            dashboard,
            hierarchy,
            columns: metric_engine::column_names(rows),
        }
    }

    pub fn group(&self, id: &str) -> Option<&'a IndicatorGroup> {
        self.groups.get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric_engine::{row, CellValue};

    #[test]
    fn indexes_groups_and_columns() {
        let rows = vec![
            row([("region", CellValue::from("North"))]),
            row([("price", CellValue::from(1.0))]),
        ];
        let groups = vec![IndicatorGroup::new("north", "North")];
        let templates = TemplateMap::default();
        let dashboard = Dashboard::new("d", "D");
        let hierarchy = HierarchyContext::new(["region"]);

        let ctx = ComputationContext::new(&rows, &groups, &templates, &dashboard, &hierarchy);

        assert_eq!(ctx.group("north").map(|g| g.name.as_str()), Some("North"));
        assert!(ctx.group("south").is_none());
        assert_eq!(ctx.columns, vec!["price", "region"]);
    }
}
