//! FILENAME: metric-engine/src/lib.rs
//! PURPOSE: Main library entry point for the metric engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.
//! The dashboard engine composes these pieces per indicator group:
//! filter rows, order metrics, evaluate each metric, format the value.

pub mod aggregate;
pub mod config;
pub mod definition;
pub mod dependency;
pub mod error;
pub mod filter;
pub mod formula;
pub mod hierarchy;
pub mod logging;
pub mod number_format;
pub mod value;

// Re-export commonly used types at the crate root
pub use aggregate::{aggregate_column, evaluate_aggregate, numeric_column, DEFAULT_PERCENTILE};
pub use config::{CacheConfig, ConfigError, EngineConfig, DEFAULT_CACHE_TTL_MS};
pub use definition::{
    index_templates, AggregateFunction, DependencySlot, DisplayFormat, FilterCondition,
    GroupMetric, HierarchyFilterValue, IndicatorGroup, MetricKind, MetricTemplate, SlotKind,
    TemplateMap,
};
pub use dependency::{CycleError, DependencyGraph, DependencyResolver, EvaluationPlan};
pub use error::{EngineError, ErrorCode};
pub use filter::{filter_rows, missing_columns, row_matches, FilterOperator, UnknownOperatorPolicy};
pub use formula::{evaluate_formula, FormulaEvaluator, FormulaOutcome, Scope};
pub use hierarchy::{deepest_filter, ActiveFilter, HierarchyContext, HierarchySelection};
pub use number_format::{format_optional, format_value, NumberFormatter};
pub use value::{column_names, row, CellValue, Row};
