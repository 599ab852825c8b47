//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the config supplies one.
pub const DEFAULT_FILTER: &str = "info,harness=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_directive`. Calling this twice is harmless;
/// the second subscriber is simply not installed.
///
/// # Example
/// ```
/// harness_core::init_logging(harness_core::DEFAULT_FILTER);
/// tracing::info!("Harness starting");
/// ```
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
