//! FILENAME: dashboard-engine/src/lib.rs
//! Dashboard subsystem for indicator group comparison tables.
//!
//! This crate turns raw rows plus group, template and dashboard definitions
//! into one `DashboardComputationResult`. It depends on `metric-engine` for
//! filtering, formula evaluation, dependency ordering and formatting.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the dashboard IS)
//! - `context`: Explicit computation input (rows, definitions, hierarchy)
//! - `group`: Per-group computation (HOW metrics are computed)
//! - `binder`: Virtual metric columns mapped onto group metrics
//! - `cache`: Computed values keyed by filter-state fingerprint
//! - `result`: Renderable output for the presentation layer (WHAT we display)
//! - `aggregator`: Orchestration and session state

pub mod aggregator;
pub mod binder;
pub mod cache;
pub mod context;
pub mod definition;
pub mod group;
pub mod result;

pub use aggregator::{compute_dashboard, DashboardAggregator};
pub use binder::{bind_group, missing_group_row};
pub use cache::{generate_cache_key, InMemoryCache, MetricCache, NoopCache};
pub use context::ComputationContext;
pub use definition::*;
pub use group::{compute_group, compute_group_in, effective_conditions, GroupComputation};
pub use result::*;
