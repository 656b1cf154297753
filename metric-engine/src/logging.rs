//! FILENAME: metric-engine/src/logging.rs
//! PURPOSE: Category-tagged logging macros shared by the engine crates.
//! CONTEXT: The engine never installs a logger. Every record goes through the
//! `log` facade with the category as its target, so the host decides where
//! FILTER / FORMULA / DEPS / GROUP / CACHE / DASHBOARD records end up.

#[doc(hidden)]
pub use log;

pub const FILTER: &str = "FILTER";
pub const FORMULA: &str = "FORMULA";
pub const DEPS: &str = "DEPS";
pub const GROUP: &str = "GROUP";
pub const CACHE: &str = "CACHE";
pub const DASHBOARD: &str = "DASHBOARD";

// ============================================================================
// MACRO DEFINITIONS & EXPORTS
// ============================================================================

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::log::debug!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::log::info!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::log::warn!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::log::error!(target: $cat, $($arg)*)
    };
}
