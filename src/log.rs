use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Global flag to control per-frame pipeline logging
pub static PIPELINE_DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set per-frame pipeline logging on/off
pub fn set_pipeline_debug(enabled: bool) {
    PIPELINE_DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!(
        "Pipeline debug logging {}",
        if enabled { "ENABLED" } else { "DISABLED" }
    );
}

/// Check if per-frame pipeline logging is enabled
pub fn is_pipeline_debug_enabled() -> bool {
    PIPELINE_DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Install the global tracing subscriber
///
/// `verbose` forces debug output for this crate; otherwise `RUST_LOG` applies,
/// falling back to info.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("aec_sync_lib=debug,aec_sync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A subscriber may already be installed (tests, embedding applications)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Pipeline debug macro - only logs if pipeline debug is enabled
#[macro_export]
macro_rules! pipeline_debug {
    ($($arg:tt)*) => {
        if $crate::log::PIPELINE_DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}
