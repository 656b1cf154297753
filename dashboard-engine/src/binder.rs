//! FILENAME: dashboard-engine/src/binder.rs
//! PURPOSE: Maps dashboard virtual metric columns onto a group's computed metrics.
//! CONTEXT: Each group row independently chooses which of its own metrics
//! answers each column. An unbound column is a null cell, never zero and
//! never an error; a binding to a metric the group does not compute is a
//! null cell carrying an `UNRESOLVED_DEPENDENCY` note.

use metric_engine::logging::DASHBOARD;
use metric_engine::{log_debug, EngineConfig, EngineError};

use crate::definition::{Dashboard, IndicatorGroupInDashboard, VirtualMetric};
use crate::group::GroupComputation;
use crate::result::{GroupComputationResult, ResultError, VirtualMetricValue};

/// Builds one dashboard row from a group computation.
pub fn bind_group(
    dashboard: &Dashboard,
    placement: &IndicatorGroupInDashboard,
    computation: &GroupComputation,
    config: &EngineConfig,
) -> GroupComputationResult {
    let values = dashboard
        .ordered_virtual_metrics()
        .into_iter()
        .map(|vm| bind_value(vm, placement, computation, config))
        .collect::<Vec<_>>();

    log_debug!(
        DASHBOARD,
        "bound group {}: {} columns, {} null",
        computation.group_id,
        values.len(),
        values.iter().filter(|v| v.value.is_none()).count()
    );

    GroupComputationResult {
        group_id: computation.group_id.clone(),
        group_name: computation.group_name.clone(),
        values,
        record_count: computation.record_count,
        computed_at: computation.computed_at,
        error: computation.error.as_ref().map(ResultError::from),
        warnings: computation.warnings.iter().map(ResultError::from).collect(),
    }
}

fn bind_value(
    vm: &VirtualMetric,
    placement: &IndicatorGroupInDashboard,
    computation: &GroupComputation,
    config: &EngineConfig,
) -> VirtualMetricValue {
    let Some(metric_id) = placement.binding_for(&vm.id) else {
        return null_cell(vm, None, None, config);
    };

    let Some(computed) = computation.value(metric_id) else {
        let err = EngineError::UnresolvedDependency {
            virtual_metric: vm.id.clone(),
            group: computation.group_id.clone(),
        };
        return null_cell(vm, Some(metric_id), Some(ResultError::from(&err)), config);
    };

    VirtualMetricValue {
        virtual_metric_id: vm.id.clone(),
        virtual_metric_name: vm.name.clone(),
        value: computed.value,
        formatted_value: computed.formatted_value.clone(),
        source_metric_id: Some(metric_id.to_string()),
        color: computed
            .value
            .and_then(|v| vm.color_for(v))
            .map(str::to_string),
        error: computed.error.clone(),
    }
}

fn null_cell(
    vm: &VirtualMetric,
    source: Option<&str>,
    error: Option<ResultError>,
    config: &EngineConfig,
) -> VirtualMetricValue {
    VirtualMetricValue {
        virtual_metric_id: vm.id.clone(),
        virtual_metric_name: vm.name.clone(),
        value: None,
        formatted_value: config.null_display.clone(),
        source_metric_id: source.map(str::to_string),
        color: None,
        error,
    }
}

/// A row for a group the dashboard references but the context lacks.
pub fn missing_group_row(
    dashboard: &Dashboard,
    placement: &IndicatorGroupInDashboard,
    config: &EngineConfig,
    now: i64,
) -> GroupComputationResult {
    let err = ResultError::from(&EngineError::GroupNotFound(placement.group_id.clone()));
    GroupComputationResult {
        group_id: placement.group_id.clone(),
        group_name: placement.group_id.clone(),
        values: dashboard
            .ordered_virtual_metrics()
            .into_iter()
            .map(|vm| null_cell(vm, placement.binding_for(&vm.id), None, config))
            .collect(),
        record_count: 0,
        computed_at: now,
        error: Some(err),
        warnings: Vec::new(),
    }
}
