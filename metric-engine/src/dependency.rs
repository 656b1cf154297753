//! FILENAME: metric-engine/src/dependency.rs
//! PURPOSE: Orders the metrics of a group so every metric follows its inputs.
//! CONTEXT: A calculated metric may reference other metrics of its group via
//! metric slots. This module tracks those references as a directed graph
//! (precedents/dependents), detects cycles, and computes the evaluation
//! order with a topological sort.
//!
//! TERMINOLOGY:
//! - Precedents: Metrics a metric references (its inputs).
//!   If margin = revenue - cost, then revenue and cost are precedents of margin.
//! - Dependents: Metrics that reference a given metric (reverse lookup).
//!   If margin = revenue - cost, then margin is a dependent of revenue.
//!
//! FAILURE MODES:
//! - A cycle (including a self reference) fails the whole group.
//! - An unbound metric slot, a reference to an absent or disabled metric, or
//!   a missing template fails that metric and, transitively, its dependents.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::definition::{IndicatorGroup, SlotKind, TemplateMap};
use crate::error::EngineError;
use crate::logging::DEPS;
use crate::{log_debug, log_warn};

/// Error type for cycle detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    /// The metrics involved in the cycle, in order. A closed cycle repeats
    /// its first metric at the end.
    pub cycle_path: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circular dependency detected: {}", self.cycle_path.join(" -> "))
    }
}

impl std::error::Error for CycleError {}

impl From<CycleError> for EngineError {
    fn from(err: CycleError) -> Self {
        EngineError::CircularDependency(err.cycle_path)
    }
}

/// The Dependency Graph tracks references between the metrics of one group.
/// It maintains both forward (precedents) and reverse (dependents) mappings
/// for efficient lookups in either direction.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// For each metric, the metrics it directly references.
    precedents: FxHashMap<String, FxHashSet<String>>,

    /// For each metric, the metrics that directly reference it.
    dependents: FxHashMap<String, FxHashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Sets the dependencies for a metric, replacing any previous ones.
    /// This does NOT check for cycles. Use `would_create_cycle()` first if needed.
    pub fn set_dependencies<I>(&mut self, metric: &str, new_precedents: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.clear_dependencies(metric);

        let precs: FxHashSet<String> = new_precedents.into_iter().collect();
        if precs.is_empty() {
            return;
        }

        for prec in &precs {
            self.dependents
                .entry(prec.clone())
                .or_default()
                .insert(metric.to_string());
        }
        self.precedents.insert(metric.to_string(), precs);
    }

    /// Clears all dependencies for a metric.
    pub fn clear_dependencies(&mut self, metric: &str) {
        if let Some(old_precs) = self.precedents.remove(metric) {
            for prec in old_precs {
                if let Some(deps) = self.dependents.get_mut(&prec) {
                    deps.remove(metric);
                    if deps.is_empty() {
                        self.dependents.remove(&prec);
                    }
                }
            }
        }
    }

    pub fn get_precedents(&self, metric: &str) -> Option<&FxHashSet<String>> {
        self.precedents.get(metric)
    }

    pub fn get_dependents(&self, metric: &str) -> Option<&FxHashSet<String>> {
        self.dependents.get(metric)
    }

    /// Checks if making `metric` depend on `new_precedents` would create a
    /// cycle. Performs a DFS from each new precedent to see if it reaches
    /// the metric.
    pub fn would_create_cycle(&self, metric: &str, new_precedents: &[String]) -> bool {
        if new_precedents.iter().any(|p| p == metric) {
            return true;
        }
        new_precedents.iter().any(|p| self.can_reach(p, metric))
    }

    /// Checks if `start` can reach `target` by following precedent chains.
    fn can_reach(&self, start: &str, target: &str) -> bool {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(precs) = self.precedents.get(current) {
                for prec in precs {
                    if !visited.contains(prec.as_str()) {
                        stack.push(prec.as_str());
                    }
                }
            }
        }

        false
    }

    /// All transitive dependents of a metric (not including the metric itself).
    pub fn transitive_dependents(&self, metric: &str) -> FxHashSet<String> {
        let mut result = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some(deps) = self.dependents.get(metric) {
            queue.extend(deps.iter().map(String::as_str));
        }

        while let Some(current) = queue.pop_front() {
            if !result.insert(current.to_string()) {
                continue;
            }
            if let Some(deps) = self.dependents.get(current) {
                for dep in deps {
                    if !result.contains(dep) {
                        queue.push_back(dep.as_str());
                    }
                }
            }
        }

        result
    }

    /// Topologically sorts `nodes` with Kahn's algorithm. Each node carries a
    /// rank; among nodes that are ready at the same time the lowest rank is
    /// emitted first, so independent metrics keep their declared order.
    pub fn topological_sort(&self, nodes: &[(String, (i32, usize))]) -> Result<Vec<String>, CycleError> {
        let rank: FxHashMap<&str, (i32, usize)> =
            nodes.iter().map(|(id, r)| (id.as_str(), *r)).collect();

        // In-degree counting only edges within the node set
        let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
        for (id, _) in nodes {
            let count = self
                .precedents
                .get(id)
                .map(|precs| precs.iter().filter(|p| rank.contains_key(p.as_str())).count())
                .unwrap_or(0);
            in_degree.insert(id.as_str(), count);
        }

        let mut ready: BTreeSet<((i32, usize), &str)> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .filter_map(|(&id, _)| rank.get(id).map(|r| (*r, id)))
            .collect();

        let mut result = Vec::with_capacity(nodes.len());

        while let Some(next) = ready.pop_first() {
            let (_, id) = next;
            result.push(id.to_string());

            if let Some(deps) = self.dependents.get(id) {
                for dep in deps {
                    if let Some(deg) = in_degree.get_mut(dep.as_str()) {
                        *deg -= 1;
                        if *deg == 0 {
                            if let Some(r) = rank.get(dep.as_str()) {
                                ready.insert((*r, dep.as_str()));
                            }
                        }
                    }
                }
            }
        }

        if result.len() != nodes.len() {
            let mut cycle_nodes: Vec<(&(i32, usize), &str)> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .filter_map(|(&id, _)| rank.get(id).map(|r| (r, id)))
                .collect();
            cycle_nodes.sort();
            let cycle: Vec<&str> = cycle_nodes.into_iter().map(|(_, id)| id).collect();
            return Err(CycleError {
                cycle_path: self.find_cycle_path(&cycle, &rank),
            });
        }

        Ok(result)
    }

    /// Traces precedents from the lowest-ranked stuck node to report the
    /// cycle. Falls back to the stuck nodes when no closed path is found
    /// (nodes merely downstream of a cycle are also stuck).
    fn find_cycle_path(&self, stuck: &[&str], rank: &FxHashMap<&str, (i32, usize)>) -> Vec<String> {
        let stuck_set: FxHashSet<&str> = stuck.iter().copied().collect();

        for &start in stuck {
            let mut path: Vec<&str> = vec![start];
            let mut current = start;

            for _ in 0..stuck.len() {
                let next = self.precedents.get(current).and_then(|precs| {
                    precs
                        .iter()
                        .map(String::as_str)
                        .filter(|p| stuck_set.contains(p))
                        .min_by_key(|p| rank.get(p).copied())
                });
                let Some(next) = next else { break };

                if let Some(pos) = path.iter().position(|p| *p == next) {
                    // Closed loop; report only the looping part
                    let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.to_string());
                    return cycle;
                }
                path.push(next);
                current = next;
            }
        }

        stuck.iter().map(|s| s.to_string()).collect()
    }

    pub fn metric_count(&self) -> usize {
        self.precedents.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.precedents.values().map(|v| v.len()).sum()
    }

    pub fn clear(&mut self) {
        self.precedents.clear();
        self.dependents.clear();
    }
}

/// Evaluation order for one group plus the metrics that must not be
/// evaluated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationPlan {
    /// Every enabled metric id, inputs before dependents.
    pub order: Vec<String>,
    /// Metric id -> why it cannot be computed.
    pub failures: BTreeMap<String, EngineError>,
}

impl EvaluationPlan {
    pub fn failure(&self, metric_id: &str) -> Option<&EngineError> {
        self.failures.get(metric_id)
    }
}

/// Metric references of one metric: (slot name, target metric id).
type SlotRefs = SmallVec<[(String, String); 4]>;

/// Builds the dependency graph of a group and resolves its evaluation plan.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    graph: DependencyGraph,
}

impl DependencyResolver {
    pub fn new() -> Self {
        DependencyResolver::default()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Resolves the evaluation plan of a group's enabled metrics.
    /// A cycle is returned as `Err`; per-metric problems are recorded in the
    /// plan's failures and cascade to every dependent.
    pub fn resolve(
        &mut self,
        group: &IndicatorGroup,
        templates: &TemplateMap,
    ) -> Result<EvaluationPlan, CycleError> {
        self.graph.clear();
        let mut failures: BTreeMap<String, EngineError> = BTreeMap::new();
        let mut refs: FxHashMap<&str, SlotRefs> = FxHashMap::default();
        let mut nodes: Vec<(String, (i32, usize))> = Vec::new();

        for (position, metric) in group.metrics.iter().enumerate() {
            if !metric.enabled {
                continue;
            }
            nodes.push((metric.id.clone(), (metric.order, position)));

            let mut slot_refs: SlotRefs = SmallVec::new();
            match templates.get(&metric.template_id) {
                Some(template) => {
                    for slot in template.slots(SlotKind::Metric) {
                        if !metric.metric_bindings.contains_key(&slot.name) {
                            failures.entry(metric.id.clone()).or_insert_with(|| {
                                EngineError::MissingBinding {
                                    metric: metric.id.clone(),
                                    slot: slot.name.clone(),
                                    reason: "metric slot is not bound".to_string(),
                                }
                            });
                        }
                    }
                }
                None => {
                    failures
                        .entry(metric.id.clone())
                        .or_insert_with(|| EngineError::TemplateNotFound(metric.template_id.clone()));
                }
            }

            let mut precedents = Vec::new();
            for (slot, target) in &metric.metric_bindings {
                if target != &metric.id {
                    if let Err(reason) = check_target(group, target) {
                        failures.entry(metric.id.clone()).or_insert_with(|| {
                            EngineError::MissingBinding {
                                metric: metric.id.clone(),
                                slot: slot.clone(),
                                reason,
                            }
                        });
                        continue;
                    }
                }
                precedents.push(target.clone());
                slot_refs.push((slot.clone(), target.clone()));
            }

            self.graph.set_dependencies(&metric.id, precedents);
            refs.insert(metric.id.as_str(), slot_refs);
        }

        let order = self.graph.topological_sort(&nodes).map_err(|err| {
            log_warn!(DEPS, "group {}: {}", group.id, err);
            err
        })?;

        // Cascade along the order: inputs are decided before dependents
        for id in &order {
            if failures.contains_key(id) {
                continue;
            }
            let failed_input = refs
                .get(id.as_str())
                .and_then(|r| r.iter().find(|(_, target)| failures.contains_key(target)));
            if let Some((slot, target)) = failed_input {
                failures.insert(
                    id.clone(),
                    EngineError::MissingBinding {
                        metric: id.clone(),
                        slot: slot.clone(),
                        reason: format!("depends on failed metric {}", target),
                    },
                );
            }
        }

        for (id, err) in &failures {
            log_warn!(DEPS, "group {} metric {} cannot be computed: {}", group.id, id, err);
        }
        log_debug!(
            DEPS,
            "group {} metrics={} edges={} order=[{}] failures={}",
            group.id,
            self.graph.metric_count(),
            self.graph.dependency_count(),
            order.join(", "),
            failures.len()
        );

        Ok(EvaluationPlan { order, failures })
    }

    /// Validates a proposed metric slot binding before it is stored:
    /// rejects self references, references to metrics not in the group, and
    /// bindings that would close a cycle with the group's current bindings.
    pub fn check_binding(
        group: &IndicatorGroup,
        metric_id: &str,
        target_id: &str,
    ) -> Result<(), EngineError> {
        if metric_id == target_id {
            return Err(EngineError::CircularDependency(vec![
                metric_id.to_string(),
                target_id.to_string(),
            ]));
        }
        if let Err(reason) = check_target(group, target_id) {
            return Err(EngineError::MissingBinding {
                metric: metric_id.to_string(),
                slot: String::new(),
                reason,
            });
        }

        let mut graph = DependencyGraph::new();
        for metric in &group.metrics {
            graph.set_dependencies(&metric.id, metric.metric_bindings.values().cloned());
        }
        if graph.would_create_cycle(metric_id, &[target_id.to_string()]) {
            return Err(EngineError::CircularDependency(vec![
                metric_id.to_string(),
                target_id.to_string(),
                metric_id.to_string(),
            ]));
        }
        Ok(())
    }
}

fn check_target(group: &IndicatorGroup, target: &str) -> Result<(), String> {
    match group.metric(target) {
        None => Err(format!("metric {} does not exist in group {}", target, group.id)),
        Some(m) if !m.enabled => Err(format!("metric {} is disabled", target)),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        index_templates, AggregateFunction, DependencySlot, GroupMetric, MetricTemplate,
    };
    use crate::error::ErrorCode;

    fn templates() -> TemplateMap {
        index_templates([
            MetricTemplate::aggregate("sum", AggregateFunction::Sum, "amount"),
            MetricTemplate::calculated("ratio", "a / b", vec![
                DependencySlot::metric("a"),
                DependencySlot::metric("b"),
            ]),
            MetricTemplate::calculated("double", "x * 2", vec![DependencySlot::metric("x")]),
        ])
    }

    fn agg(id: &str, order: i32) -> GroupMetric {
        GroupMetric::new(id, "sum", order).bind_field("amount", "price")
    }

    fn double(id: &str, of: &str, order: i32) -> GroupMetric {
        GroupMetric::new(id, "double", order).bind_metric("x", of)
    }

    fn resolve(group: &IndicatorGroup) -> Result<EvaluationPlan, CycleError> {
        DependencyResolver::new().resolve(group, &templates())
    }

    #[test]
    fn test_set_and_get_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("margin", vec!["revenue".to_string(), "cost".to_string()]);

        let precs = graph.get_precedents("margin").unwrap();
        assert!(precs.contains("revenue"));
        assert!(precs.contains("cost"));
        assert!(graph.get_dependents("revenue").unwrap().contains("margin"));
    }

    #[test]
    fn test_update_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("c", vec!["a".to_string()]);
        graph.set_dependencies("c", vec!["b".to_string()]);

        assert!(graph.get_dependents("a").is_none());
        assert!(graph.get_dependents("b").unwrap().contains("c"));
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_would_create_cycle() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("b", vec!["a".to_string()]);
        graph.set_dependencies("c", vec!["b".to_string()]);

        assert!(graph.would_create_cycle("a", &["c".to_string()]));
        assert!(graph.would_create_cycle("a", &["a".to_string()]));
        assert!(!graph.would_create_cycle("d", &["c".to_string()]));
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("b", vec!["a".to_string()]);
        graph.set_dependencies("c", vec!["b".to_string()]);
        graph.set_dependencies("d", vec!["x".to_string()]);

        let deps = graph.transitive_dependents("a");
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("b") && deps.contains("c"));
    }

    #[test]
    fn inputs_precede_dependents() {
        // Declared out of order on purpose
        let group = IndicatorGroup::new("g", "G")
            .with_metric(double("b", "a", 0))
            .with_metric(agg("a", 1));

        let mut resolver = DependencyResolver::new();
        let plan = resolver.resolve(&group, &templates()).unwrap();
        assert_eq!(plan.order, vec!["a", "b"]);
        assert!(plan.failures.is_empty());
        assert_eq!(resolver.graph().metric_count(), 2);
        assert_eq!(resolver.graph().dependency_count(), 1);
    }

    #[test]
    fn independent_metrics_keep_declared_order() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(agg("z", 2))
            .with_metric(agg("y", 1))
            .with_metric(agg("x", 1));

        let plan = resolve(&group).unwrap();
        assert_eq!(plan.order, vec!["y", "x", "z"]);
    }

    #[test]
    fn mutual_reference_is_a_cycle() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(double("x", "y", 0))
            .with_metric(double("y", "x", 1));

        let err = resolve(&group).unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert_eq!(err.cycle_path.len(), 3);
        assert_eq!(EngineError::from(err).code(), ErrorCode::CircularDependency);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let group = IndicatorGroup::new("g", "G").with_metric(double("x", "x", 0));

        let err = resolve(&group).unwrap_err();
        assert_eq!(err.cycle_path, vec!["x", "x"]);
    }

    #[test]
    fn missing_target_fails_metric_and_dependents_only() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(agg("a", 0))
            .with_metric(double("b", "ghost", 1))
            .with_metric(double("c", "b", 2))
            .with_metric(double("d", "a", 3));

        let plan = resolve(&group).unwrap();
        assert_eq!(plan.failure("b").unwrap().code(), ErrorCode::MissingBinding);
        assert_eq!(plan.failure("c").unwrap().code(), ErrorCode::MissingBinding);
        assert!(plan.failure("a").is_none());
        assert!(plan.failure("d").is_none());
        assert_eq!(plan.order.len(), 4);
    }

    #[test]
    fn unbound_declared_slot_is_missing_binding() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(agg("a", 0))
            .with_metric(GroupMetric::new("r", "ratio", 1).bind_metric("a", "a"));

        let plan = resolve(&group).unwrap();
        match plan.failure("r") {
            Some(EngineError::MissingBinding { slot, .. }) => assert_eq!(slot, "b"),
            other => panic!("expected missing binding, got {:?}", other),
        }
    }

    #[test]
    fn disabled_target_and_missing_template_fail() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(agg("a", 0).disabled())
            .with_metric(double("b", "a", 1))
            .with_metric(GroupMetric::new("c", "nope", 2));

        let plan = resolve(&group).unwrap();
        assert_eq!(plan.order, vec!["b", "c"]);
        assert_eq!(plan.failure("b").unwrap().code(), ErrorCode::MissingBinding);
        assert_eq!(plan.failure("c").unwrap().code(), ErrorCode::TemplateNotFound);
    }

    #[test]
    fn check_binding_rejects_self_forward_and_cyclic_references() {
        let group = IndicatorGroup::new("g", "G")
            .with_metric(agg("a", 0))
            .with_metric(double("b", "a", 1));

        assert!(DependencyResolver::check_binding(&group, "b", "b").is_err());
        assert!(DependencyResolver::check_binding(&group, "b", "later").is_err());
        assert_eq!(
            DependencyResolver::check_binding(&group, "a", "b")
                .unwrap_err()
                .code(),
            ErrorCode::CircularDependency
        );
        assert!(DependencyResolver::check_binding(&group, "b", "a").is_ok());
    }
}
