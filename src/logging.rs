//! Logging and tracing configuration
//!
//! Structured logging through the `tracing` crate. Call [`init`] once at
//! startup; library code only emits events.
//!
//! # Environment Variable Control
//!
//! ```bash
//! RUST_LOG=debug ledger-forensics analyze ...                    # Everything at debug
//! RUST_LOG=ledger_forensics::detectors=trace ledger-forensics ...  # One module
//! RUST_LOG=forensic_audit=info,warn ledger-forensics ...           # Audit trail only
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) || cfg!(feature = "debug-logging") {
        EnvFilter::new("ledger_forensics=debug,forensic_audit=info")
    } else {
        EnvFilter::new("ledger_forensics=info,forensic_audit=info")
    }
}

/// Initialize the logging/tracing system
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    // Ignore the error if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Verbose output with file:line and thread IDs
pub fn init_verbose() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Skip expensive debug-only work when nobody is listening
#[inline]
pub fn is_debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}
