//! FILENAME: dashboard-engine/src/result.rs
//! Dashboard Results - Renderable output for the presentation layer.
//!
//! Every recomputation produces new snapshot objects; nothing here is
//! patched in place. A `None` value means "not available" (unbound column,
//! failed metric, failed group) and must stay distinguishable from a
//! computed zero.

use metric_engine::{DisplayFormat, EngineError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Error attached to a value or row: stable code plus human message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&EngineError> for ResultError {
    fn from(err: &EngineError) -> Self {
        ResultError {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// One metric of one group, as computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedMetricValue {
    pub metric_id: String,
    pub group_id: String,
    pub value: Option<f64>,
    pub formatted_value: String,
    /// Rows of the filtered subset the metric was computed over.
    pub record_count: usize,
    /// Epoch milliseconds.
    pub computed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

/// One cell of the dashboard table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMetricValue {
    pub virtual_metric_id: String,
    pub virtual_metric_name: String,
    pub value: Option<f64>,
    pub formatted_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_metric_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

impl VirtualMetricValue {
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// One row of the dashboard table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupComputationResult {
    pub group_id: String,
    pub group_name: String,
    pub values: Vec<VirtualMetricValue>,
    pub record_count: usize,
    pub computed_at: i64,
    /// Group-fatal error (cycle, unknown group). Cells are then all null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
    /// Non-fatal notes such as filter columns missing from the data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResultError>,
}

impl GroupComputationResult {
    pub fn value(&self, virtual_metric_id: &str) -> Option<&VirtualMetricValue> {
        self.values
            .iter()
            .find(|v| v.virtual_metric_id == virtual_metric_id)
    }
}

/// Column header of the dashboard table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMetricColumn {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub display_format: DisplayFormat,
    pub decimal_places: u8,
}

/// The full table handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardComputationResult {
    pub dashboard_id: String,
    pub columns: Vec<VirtualMetricColumn>,
    pub groups: Vec<GroupComputationResult>,
    /// Rows in the input data set.
    pub total_record_count: usize,
    pub computation_time_ms: i64,
    pub computed_at: i64,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl DashboardComputationResult {
    pub fn group(&self, group_id: &str) -> Option<&GroupComputationResult> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    /// Numeric content only: (group, column, value) in table order.
    /// Two results with the same content compare equal here even when their
    /// timestamps differ.
    pub fn value_matrix(&self) -> Vec<(String, String, Option<f64>)> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.values
                    .iter()
                    .map(move |v| (g.group_id.clone(), v.virtual_metric_id.clone(), v.value))
            })
            .collect()
    }
}

/// Cache introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub expired: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_zero_serialize_differently() {
        let null_cell = VirtualMetricValue {
            virtual_metric_id: "vm".into(),
            virtual_metric_name: "VM".into(),
            value: None,
            formatted_value: "-".into(),
            source_metric_id: None,
            color: None,
            error: None,
        };
        let zero_cell = VirtualMetricValue {
            value: Some(0.0),
            formatted_value: "0.00".into(),
            source_metric_id: Some("m".into()),
            ..null_cell.clone()
        };

        let null_json = serde_json::to_value(&null_cell).unwrap();
        let zero_json = serde_json::to_value(&zero_cell).unwrap();

        assert!(null_json["value"].is_null());
        assert_eq!(zero_json["value"], serde_json::json!(0.0));
        assert_eq!(zero_json["sourceMetricId"], "m");
        assert!(null_json.get("sourceMetricId").is_none());
    }

    #[test]
    fn result_error_carries_code() {
        let err = ResultError::from(&EngineError::GroupNotFound("g".into()));
        assert_eq!(err.code, ErrorCode::GroupNotFound);
        assert!(err.message.contains("g"));
    }
}
