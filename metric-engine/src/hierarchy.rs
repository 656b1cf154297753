//! FILENAME: metric-engine/src/hierarchy.rs
//! PURPOSE: Resolves the active level of a hierarchical filter path.
//! CONTEXT: Levels (e.g. region -> city -> district) are column names in a
//! globally configured order. The user selects a contiguous prefix of them;
//! the deepest selected level becomes an implicit `column = value`
//! condition for every group that does not declare its own path.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::definition::{FilterCondition, HierarchyFilterValue};
use crate::filter::FilterOperator;

/// The deepest selected level and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFilter {
    pub level: String,
    pub value: String,
}

impl ActiveFilter {
    /// The implicit filter condition this level imposes on rows.
    pub fn to_condition(&self) -> FilterCondition {
        FilterCondition::new(self.level.clone(), FilterOperator::Equal, self.value.as_str())
    }
}

/// Sparse level -> selected value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HierarchySelection {
    values: FxHashMap<String, String>,
}

impl HierarchySelection {
    pub fn new() -> Self {
        HierarchySelection::default()
    }

    pub fn get(&self, level: &str) -> Option<&str> {
        self.values
            .get(level)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Selects a value for a level and clears every deeper level, so the
    /// selection always stays a contiguous prefix. An empty value clears
    /// the level itself too.
    pub fn select(&mut self, levels: &[String], level: &str, value: impl Into<String>) {
        let value = value.into();
        self.clear_deeper(levels, level);
        if value.trim().is_empty() {
            self.values.remove(level);
        } else {
            self.values.insert(level.to_string(), value);
        }
    }

    /// Clears a level and everything below it.
    pub fn clear_level(&mut self, levels: &[String], level: &str) {
        self.clear_deeper(levels, level);
        self.values.remove(level);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn clear_deeper(&mut self, levels: &[String], level: &str) {
        if let Some(idx) = levels.iter().position(|l| l == level) {
            for deeper in &levels[idx + 1..] {
                self.values.remove(deeper);
            }
        }
    }

    /// Selected (level, value) pairs in level order, stopping at the first
    /// gap.
    pub fn path(&self, levels: &[String]) -> Vec<HierarchyFilterValue> {
        levels
            .iter()
            .map_while(|level| {
                self.get(level)
                    .map(|value| HierarchyFilterValue::new(level.as_str(), value))
            })
            .collect()
    }

    /// Every selected (level, value) pair in level order, gaps skipped.
    /// A selection loaded from storage may skip a parent level; the active
    /// filter still applies, so every selected level is part of the state.
    pub fn selected(&self, levels: &[String]) -> Vec<HierarchyFilterValue> {
        levels
            .iter()
            .filter_map(|level| {
                self.get(level)
                    .map(|value| HierarchyFilterValue::new(level.as_str(), value))
            })
            .collect()
    }

    /// Walks from the deepest configured level upward and returns the first
    /// level with a non-empty value.
    pub fn active_filter(&self, levels: &[String]) -> Option<ActiveFilter> {
        levels.iter().rev().find_map(|level| {
            self.get(level).map(|value| ActiveFilter {
                level: level.clone(),
                value: value.to_string(),
            })
        })
    }
}

/// Deepest non-empty entry of a group-declared path.
/// Levels are ranked by the configured order; when none of the entries name
/// a configured level, the last non-empty entry in declaration order wins.
pub fn deepest_filter(levels: &[String], filters: &[HierarchyFilterValue]) -> Option<ActiveFilter> {
    let non_empty = filters.iter().filter(|f| !f.value.trim().is_empty());

    let ranked = non_empty
        .clone()
        .filter_map(|f| levels.iter().position(|l| *l == f.level).map(|rank| (rank, f)))
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, f)| f);

    ranked.or_else(|| non_empty.last()).map(|f| ActiveFilter {
        level: f.level.clone(),
        value: f.value.clone(),
    })
}

/// Configured level order plus the dashboard-wide selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyContext {
    pub levels: Vec<String>,
    #[serde(default)]
    pub selection: HierarchySelection,
}

impl HierarchyContext {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HierarchyContext {
            levels: levels.into_iter().map(Into::into).collect(),
            selection: HierarchySelection::new(),
        }
    }

    pub fn select(mut self, level: &str, value: impl Into<String>) -> Self {
        self.selection.select(&self.levels, level, value);
        self
    }

    /// Dashboard-wide active filter.
    pub fn active_filter(&self) -> Option<ActiveFilter> {
        self.selection.active_filter(&self.levels)
    }

    /// The filter a group actually computes under: its own path when it
    /// declares one, otherwise the dashboard-wide selection.
    pub fn effective_filter(&self, group_filters: &[HierarchyFilterValue]) -> Option<ActiveFilter> {
        if has_values(group_filters) {
            deepest_filter(&self.levels, group_filters)
        } else {
            self.active_filter()
        }
    }

    /// (level, value) pairs identifying the filter state a group computed
    /// under, for cache fingerprints. Covers every selected level, so the
    /// active filter is always part of the fingerprint.
    pub fn filter_pairs(&self, group_filters: &[HierarchyFilterValue]) -> Vec<HierarchyFilterValue> {
        if has_values(group_filters) {
            group_filters
                .iter()
                .filter(|f| !f.value.trim().is_empty())
                .cloned()
                .collect()
        } else {
            self.selection.selected(&self.levels)
        }
    }
}

fn has_values(filters: &[HierarchyFilterValue]) -> bool {
    filters.iter().any(|f| !f.value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<String> {
        vec!["region".into(), "city".into(), "district".into()]
    }

    #[test]
    fn active_filter_is_deepest_selected_level() {
        let mut sel = HierarchySelection::new();
        sel.select(&levels(), "region", "North");
        sel.select(&levels(), "city", "Oslo");

        let active = sel.active_filter(&levels()).unwrap();
        assert_eq!(active.level, "city");
        assert_eq!(active.value, "Oslo");
    }

    #[test]
    fn no_selection_means_no_active_filter() {
        assert!(HierarchySelection::new().active_filter(&levels()).is_none());
    }

    #[test]
    fn selecting_a_level_clears_deeper_levels() {
        let mut sel = HierarchySelection::new();
        sel.select(&levels(), "region", "North");
        sel.select(&levels(), "city", "Oslo");
        sel.select(&levels(), "district", "Sentrum");

        sel.select(&levels(), "region", "South");

        assert_eq!(sel.get("region"), Some("South"));
        assert_eq!(sel.get("city"), None);
        assert_eq!(sel.get("district"), None);
        assert_eq!(sel.active_filter(&levels()).unwrap().level, "region");
    }

    #[test]
    fn clearing_a_level_falls_back_to_its_parent() {
        let mut sel = HierarchySelection::new();
        sel.select(&levels(), "region", "North");
        sel.select(&levels(), "city", "Oslo");

        sel.clear_level(&levels(), "city");

        let active = sel.active_filter(&levels()).unwrap();
        assert_eq!(active.level, "region");
        assert_eq!(sel.path(&levels()).len(), 1);
    }

    #[test]
    fn path_is_in_level_order() {
        let ctx = HierarchyContext::new(levels())
            .select("region", "North")
            .select("city", "Oslo");

        let path = ctx.selection.path(&ctx.levels);
        assert_eq!(
            path,
            vec![
                HierarchyFilterValue::new("region", "North"),
                HierarchyFilterValue::new("city", "Oslo"),
            ]
        );
    }

    #[test]
    fn filter_pairs_include_levels_below_a_gap() {
        let mut ctx = HierarchyContext::new(levels());
        let lv = ctx.levels.clone();
        ctx.selection.select(&lv, "city", "Oslo");

        assert!(ctx.selection.path(&ctx.levels).is_empty());
        assert_eq!(ctx.active_filter().unwrap().value, "Oslo");
        assert_eq!(
            ctx.filter_pairs(&[]),
            vec![HierarchyFilterValue::new("city", "Oslo")]
        );

        ctx.selection.select(&lv, "city", "Bergen");
        assert_eq!(
            ctx.filter_pairs(&[]),
            vec![HierarchyFilterValue::new("city", "Bergen")]
        );
    }

    #[test]
    fn group_path_takes_precedence_over_dashboard() {
        let ctx = HierarchyContext::new(levels()).select("region", "North");
        let own = vec![
            HierarchyFilterValue::new("city", "Bergen"),
            HierarchyFilterValue::new("region", "West"),
        ];

        let active = ctx.effective_filter(&own).unwrap();
        assert_eq!(active.level, "city");
        assert_eq!(active.value, "Bergen");

        // Blank group values do not count as a declared path
        let blank = vec![HierarchyFilterValue::new("city", " ")];
        assert_eq!(ctx.effective_filter(&blank).unwrap().value, "North");
    }

    #[test]
    fn unconfigured_group_levels_use_last_entry() {
        let own = vec![
            HierarchyFilterValue::new("zone", "A"),
            HierarchyFilterValue::new("sector", "7"),
        ];
        let active = deepest_filter(&levels(), &own).unwrap();
        assert_eq!(active.level, "sector");
    }

    #[test]
    fn active_filter_becomes_equality_condition() {
        let active = ActiveFilter {
            level: "region".into(),
            value: "North".into(),
        };
        let cond = active.to_condition();
        assert_eq!(cond.column, "region");
        assert_eq!(cond.operator, FilterOperator::Equal);
    }
}
