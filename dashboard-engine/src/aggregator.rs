//! FILENAME: dashboard-engine/src/aggregator.rs
//! Dashboard Aggregator - The entry point the presentation layer calls.
//!
//! One recalculation runs the whole pipeline synchronously (filter, order,
//! evaluate, bind, merge) and produces one immutable snapshot. Groups are
//! independent: a failed group still yields its row, with null cells.

use chrono::Utc;
use metric_engine::logging::DASHBOARD;
use metric_engine::{
    log_info, log_warn, DependencyGraph, EngineConfig, EngineError, GroupMetric, IndicatorGroup,
};

use crate::binder::{bind_group, missing_group_row};
use crate::cache::{generate_cache_key, InMemoryCache, MetricCache, NoopCache};
use crate::context::ComputationContext;
use crate::group::{compute_group_in, effective_conditions, filter_warnings, GroupComputation};
use crate::result::{CacheStats, DashboardComputationResult, VirtualMetricColumn};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Computes a dashboard. Pure apart from the cache it reads and fills.
pub fn compute_dashboard(
    ctx: &ComputationContext<'_>,
    cache: &mut dyn MetricCache,
    config: &EngineConfig,
    now: i64,
) -> DashboardComputationResult {
    let started = Utc::now();
    let dashboard = ctx.dashboard;
    let mut hits = 0;
    let mut misses = 0;

    let columns = dashboard
        .ordered_virtual_metrics()
        .into_iter()
        .map(|vm| VirtualMetricColumn {
            id: vm.id.clone(),
            name: vm.name.clone(),
            unit: vm.unit.clone(),
            display_format: vm.display_format,
            decimal_places: vm.decimal_places,
        })
        .collect();

    let mut groups = Vec::new();
    for placement in dashboard.ordered_groups() {
        let Some(group) = ctx.group(&placement.group_id) else {
            log_warn!(DASHBOARD, "dashboard {} references unknown group {}", dashboard.id, placement.group_id);
            groups.push(missing_group_row(dashboard, placement, config, now));
            continue;
        };

        let computation = match cached_computation(ctx, group, cache, config, now) {
            Some(cached) => {
                hits += cached.values.len();
                cached
            }
            None => {
                let computed = compute_group_in(ctx, group, config, now);
                misses += computed.values.len();
                store(ctx, group, &computed, cache, config, now);
                computed
            }
        };

        groups.push(bind_group(dashboard, placement, &computation, config));
    }

    let elapsed = (Utc::now() - started).num_milliseconds();
    log_info!(
        DASHBOARD,
        "computed dashboard {} groups={} rows={} hits={} misses={} in {}ms",
        dashboard.id,
        groups.len(),
        ctx.rows.len(),
        hits,
        misses,
        elapsed
    );

    DashboardComputationResult {
        dashboard_id: dashboard.id.clone(),
        columns,
        groups,
        total_record_count: ctx.rows.len(),
        computation_time_ms: elapsed,
        computed_at: now,
        cache_hits: hits,
        cache_misses: misses,
    }
}

fn cache_keys(ctx: &ComputationContext<'_>, group: &IndicatorGroup) -> Vec<String> {
    let pairs = ctx.hierarchy.filter_pairs(&group.hierarchy_filters);
    group
        .metrics
        .iter()
        .filter(|m| m.enabled)
        .map(|m| generate_cache_key(&ctx.dashboard.id, &group.id, &m.id, &pairs))
        .collect()
}

/// A group is served from cache only when every enabled metric is cached.
fn cached_computation(
    ctx: &ComputationContext<'_>,
    group: &IndicatorGroup,
    cache: &mut dyn MetricCache,
    config: &EngineConfig,
    now: i64,
) -> Option<GroupComputation> {
    if !config.cache.enabled {
        return None;
    }
    let keys = cache_keys(ctx, group);
    if keys.is_empty() {
        return None;
    }

    let mut values = Vec::with_capacity(keys.len());
    for key in &keys {
        values.push(cache.get(key, now)?);
    }

    let conditions = effective_conditions(group, ctx.hierarchy);
    let warnings = filter_warnings(ctx.rows, &conditions);
    Some(GroupComputation::from_cached(group, values, warnings, now))
}

/// Results of a group that failed as a whole are not cached.
fn store(
    ctx: &ComputationContext<'_>,
    group: &IndicatorGroup,
    computation: &GroupComputation,
    cache: &mut dyn MetricCache,
    config: &EngineConfig,
    now: i64,
) {
    if !config.cache.enabled || computation.error.as_ref().is_some_and(EngineError::is_fatal) {
        return;
    }
    let pairs = ctx.hierarchy.filter_pairs(&group.hierarchy_filters);
    for value in &computation.values {
        let key = generate_cache_key(&ctx.dashboard.id, &group.id, &value.metric_id, &pairs);
        cache.set(key, value.clone(), config.cache.ttl_ms, now);
    }
}

/// Owns the cache and the latest snapshot for one presentation session.
pub struct DashboardAggregator {
    cache: Box<dyn MetricCache>,
    config: EngineConfig,
    is_computing: bool,
    last_error: Option<String>,
    last_result: Option<DashboardComputationResult>,
}

impl DashboardAggregator {
    /// Uses an in-memory cache when caching is enabled, otherwise none.
    pub fn new(config: EngineConfig) -> Self {
        let cache: Box<dyn MetricCache> = if config.cache.enabled {
            Box::new(InMemoryCache::new())
        } else {
            Box::new(NoopCache)
        };
        DashboardAggregator::with_cache(config, cache)
    }

    pub fn with_cache(config: EngineConfig, cache: Box<dyn MetricCache>) -> Self {
        DashboardAggregator {
            cache,
            config,
            is_computing: false,
            last_error: None,
            last_result: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Recomputes the dashboard and replaces the stored snapshot.
    pub fn recalculate(&mut self, ctx: &ComputationContext<'_>) -> &DashboardComputationResult {
        self.recalculate_at(ctx, now_ms())
    }

    /// `recalculate` with an explicit clock.
    pub fn recalculate_at(&mut self, ctx: &ComputationContext<'_>, now: i64) -> &DashboardComputationResult {
        self.is_computing = true;
        let result = compute_dashboard(ctx, self.cache.as_mut(), &self.config, now);
        self.is_computing = false;

        let failed: Vec<String> = result
            .groups
            .iter()
            .filter_map(|g| {
                g.error
                    .as_ref()
                    .map(|e| format!("{}: {}", g.group_name, e.message))
            })
            .collect();
        self.last_error = if failed.is_empty() {
            None
        } else {
            Some(failed.join("; "))
        };

        self.last_result.insert(result)
    }

    pub fn is_computing(&self) -> bool {
        self.is_computing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_result(&self) -> Option<&DashboardComputationResult> {
        self.last_result.as_ref()
    }

    /// Drops every cached value of one group on one dashboard.
    pub fn invalidate_group(&mut self, dashboard_id: &str, group_id: &str) -> usize {
        self.cache
            .invalidate(Some(format!("{}:{}:", dashboard_id, group_id).as_str()))
    }

    /// Drops every cached value of one dashboard.
    pub fn invalidate_dashboard(&mut self, dashboard_id: &str) -> usize {
        self.cache
            .invalidate(Some(format!("{}:", dashboard_id).as_str()))
    }

    /// Drops a metric and every metric that depends on it, transitively.
    pub fn invalidate_metric(&mut self, dashboard_id: &str, group: &IndicatorGroup, metric_id: &str) -> usize {
        let mut graph = DependencyGraph::new();
        for metric in &group.metrics {
            graph.set_dependencies(&metric.id, metric_bindings(metric));
        }

        let mut affected: Vec<String> = graph.transitive_dependents(metric_id).into_iter().collect();
        affected.push(metric_id.to_string());

        affected
            .iter()
            .map(|id| {
                self.cache
                    .invalidate(Some(format!("{}:{}:{}:", dashboard_id, group.id, id).as_str()))
            })
            .sum()
    }

    pub fn clear_cache(&mut self) {
        self.cache.invalidate(None);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache_stats_at(now_ms())
    }

    /// `cache_stats` with an explicit clock, matching `recalculate_at`.
    pub fn cache_stats_at(&self, now: i64) -> CacheStats {
        self.cache.stats(now)
    }
}

fn metric_bindings(metric: &GroupMetric) -> impl Iterator<Item = String> + '_ {
    metric.metric_bindings.values().cloned()
}
