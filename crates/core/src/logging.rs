//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,ember=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Target and thread id annotations
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("Harness initialized");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Initialize logging with an explicit fallback filter.
///
/// `RUST_LOG` still wins when it is set. Calling this more than once is
/// harmless; only the first subscriber is installed.
pub fn init_logging_with(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
