//! Diagnostic tracing for the CLI.
//!
//! Tracing output goes to stderr and is not persisted. Run history
//! (`io/history`) is the product record and is written regardless of
//! `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` selects the filter, defaulting to `warn`. `debug` forces
/// `zipcode=debug`.
///
/// # Example
/// ```bash
/// RUST_LOG=zipcode=info zipcode run "add a --verbose flag"
/// ```
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new("zipcode=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
