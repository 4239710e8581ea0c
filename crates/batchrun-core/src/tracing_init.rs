//! Log output for the runner and the CLI.
//!
//! Everything is written to stderr; stdout belongs to the launched commands.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// `RUST_LOG` when it is set and parses, `fallback` otherwise.
fn filter_from_env(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the process-wide subscriber.
///
/// `fallback_filter` applies when `RUST_LOG` is absent, e.g.
/// `"batchrun=info,batchrun_core=info"`. `json` switches to one JSON object
/// per line.
pub fn init_tracing(fallback_filter: &str, json: bool) {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter_from_env(fallback_filter));
    if json {
        registry.with(stderr_layer.json()).init();
    } else {
        registry.with(stderr_layer).init();
    }
}
