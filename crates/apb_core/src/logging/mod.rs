//! Logging infrastructure.
//!
//! This module provides:
//! - Per-run batch loggers writing to `<batch>/logs/` with an optional callback
//! - Compact mode with progress filtering
//! - Tail buffer of external tool output for failure diagnosis
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use apb_core::logging::{BatchLogger, LogConfig};
//!
//! let logger = BatchLogger::new("run_20240101", "/archive/batch_01/logs", LogConfig::default(), None).unwrap();
//! logger.step(3, "Match images");
//! logger.command("exiftool -ver");
//! logger.progress(50);
//! logger.success("Step 3 complete");
//! ```

mod batch_logger;
mod types;

pub use batch_logger::BatchLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Output goes to stderr. Calling it
/// twice is harmless; the second call is ignored.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
