//! Logging infrastructure for Trellis.
//!
//! This module provides structured logging controlled by the `TRELLIS_DEBUG` environment variable.
//!
//! # Environment Variables
//!
//! - `TRELLIS_DEBUG=true` - Enable debug logging
//! - `TRELLIS_DEBUG=1` - Enable debug logging
//! - `TRELLIS_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `TRELLIS_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use trellis_query::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```
//!
//! # Internal Logging
//!
//! Within Trellis, use the standard tracing macros:
//!
//! ```rust,ignore
//! use tracing::{debug, trace};
//!
//! debug!(relation = %name, rows = rows.len(), "Fetched eager relation");
//! trace!(table = %table, "Applying relation constraints");
//! ```

use std::sync::Once;

use crate::env::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `TRELLIS_DEBUG` environment variable.
///
/// Returns `true` if `TRELLIS_DEBUG` is set to "true", "1", or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    is_debug_enabled_in(&StdEnvSource)
}

/// [`is_debug_enabled`] against an arbitrary environment source.
pub fn is_debug_enabled_in(env: &impl EnvSource) -> bool {
    env.get("TRELLIS_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `TRELLIS_LOG_LEVEL` environment variable.
///
/// Defaults to "debug" if `TRELLIS_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    get_log_level_in(&StdEnvSource)
}

/// [`get_log_level`] against an arbitrary environment source.
pub fn get_log_level_in(env: &impl EnvSource) -> &'static str {
    let fallback = if is_debug_enabled_in(env) { "debug" } else { "warn" };
    match env.get("TRELLIS_LOG_LEVEL") {
        Some(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        None => fallback,
    }
}

/// Get the configured log format from `TRELLIS_LOG_FORMAT` environment variable.
///
/// Defaults to "json" for structured logging.
pub fn get_log_format() -> &'static str {
    get_log_format_in(&StdEnvSource)
}

/// [`get_log_format`] against an arbitrary environment source.
pub fn get_log_format_in(env: &impl EnvSource) -> &'static str {
    env.get("TRELLIS_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the Trellis logging system.
///
/// This should be called once at application startup. Subsequent calls are no-ops.
/// Without the `tracing-subscriber` feature this does nothing and the
/// application is expected to install its own subscriber.
pub fn init() {
    if !is_debug_enabled() && !StdEnvSource.contains("TRELLIS_LOG_LEVEL") {
        return;
    }
    install(get_log_level(), get_log_format());
}

/// Initialize logging at an explicit level, ignoring `TRELLIS_LOG_LEVEL`.
pub fn init_with_level(level: &'static str) {
    install(level, get_log_format());
}

/// Initialize debug logging regardless of `TRELLIS_DEBUG`.
pub fn init_debug() {
    install("debug", get_log_format());
}

#[cfg_attr(not(feature = "tracing-subscriber"), allow(unused_variables))]
fn install(level: &'static str, format: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!(
                "trellis_orm={},trellis_query={}",
                level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match format {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(level, format, "Trellis logging initialized");
        }
    });
}
