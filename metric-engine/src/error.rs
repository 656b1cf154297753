//! FILENAME: metric-engine/src/error.rs
//! PURPOSE: Error taxonomy shared by every computation stage.
//! CONTEXT: Nothing in the engine aborts its caller. These errors are
//! attached to metric values or group rows; `is_fatal` tells the group
//! engine whether the affected value can still be shown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, serializable error code for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ColumnNotFound,
    InvalidFormula,
    CircularDependency,
    MissingBinding,
    UnresolvedDependency,
    TemplateNotFound,
    GroupNotFound,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid formula: {0}")]
    InvalidFormula(String),

    #[error("Circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Missing binding for slot '{slot}' of metric {metric}: {reason}")]
    MissingBinding {
        metric: String,
        slot: String,
        reason: String,
    },

    #[error("Virtual metric {virtual_metric} has no computed source in group {group}")]
    UnresolvedDependency {
        virtual_metric: String,
        group: String,
    },

    #[error("Metric template not found: {0}")]
    TemplateNotFound(String),

    #[error("Indicator group not found: {0}")]
    GroupNotFound(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::ColumnNotFound(_) => ErrorCode::ColumnNotFound,
            EngineError::InvalidFormula(_) => ErrorCode::InvalidFormula,
            EngineError::CircularDependency(_) => ErrorCode::CircularDependency,
            EngineError::MissingBinding { .. } => ErrorCode::MissingBinding,
            EngineError::UnresolvedDependency { .. } => ErrorCode::UnresolvedDependency,
            EngineError::TemplateNotFound(_) => ErrorCode::TemplateNotFound,
            EngineError::GroupNotFound(_) => ErrorCode::GroupNotFound,
        }
    }

    /// True when the affected value must render as null instead of a number.
    /// Column and formula problems still yield a value (0 or a partial
    /// aggregate); binding, template and cycle problems do not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::CircularDependency(_)
                | EngineError::MissingBinding { .. }
                | EngineError::TemplateNotFound(_)
                | EngineError::GroupNotFound(_)
        )
    }
}
