//! Logging infrastructure for invix.
//!
//! invix uses `tracing` for structured logging. All events use target "invix"
//! and include `component` and `event` fields for filtering.
//!
//! ## Library Integration
//!
//! invix never initializes a global subscriber. Applications configure
//! tracing via `tracing_subscriber` or similar.
//!
//! ## Conventions
//!
//! - `event`: snake_case event name (required)
//! - `component`: subsystem (e.g., "gix", "item_set", "cache", "blob")
//! - Use `%` for Display, `?` for Debug formatting
//! - Per-key events stay at debug level

/// Target for all invix log events.
pub(crate) const INVIX_TARGET: &str = "invix";

/// Macro for info-level log events.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "gix",
///     event = "gix_opened",
///     name = %option.name,
///     keys = keys.len(),
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::INVIX_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::INVIX_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::INVIX_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::INVIX_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
