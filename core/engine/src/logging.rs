//! FILENAME: core/engine/src/logging.rs
// PURPOSE: Unified, category-tagged logging for the row model crates.

use std::sync::atomic::{AtomicU64, Ordering};

pub use log::Level;

// ============================================================================
// UNIFIED LOGGING SYSTEM
// ============================================================================

/// Log target shared by every row model crate.
pub const LOG_TARGET: &str = "grid";

/// Global sequence counter so interleaved lines can be re-ordered afterwards
static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

/// Get next sequence number
pub fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst) + 1
}

/// Write a log line in unified format: `seq|category|message`
pub fn write_log(level: Level, category: &str, message: &str) {
    if !log::log_enabled!(target: LOG_TARGET, level) {
        return;
    }
    let seq = next_seq();
    log::log!(target: LOG_TARGET, level, "{}|{}|{}", seq, category, message);
}

// ============================================================================
// MACRO DEFINITIONS & EXPORTS
// ============================================================================

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Debug, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Info, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Warn, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Error, $cat, &format!($($arg)*))
    };
}
