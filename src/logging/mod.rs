//! Tracing subscriber setup shared by the CLI and the exported library.

use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Environment variable holding a tracing filter, e.g. `bench_bridge=debug`.
pub const LOG_ENV: &str = "BENCH_BRIDGE_LOG";

/// Picks the filter: explicit directives, then [`LOG_ENV`], then a default.
pub fn filter_directives(explicit: Option<&str>, verbose: bool) -> String {
    if let Some(directives) = explicit.filter(|d| !d.trim().is_empty()) {
        return directives.to_string();
    }
    std::env::var(LOG_ENV).unwrap_or_else(|_| {
        if verbose { "bench_bridge=debug".to_string() } else { "bench_bridge=info".to_string() }
    })
}

/// Installs a stderr subscriber unless one is already set.
///
/// The host may load the library into a process that already configured
/// tracing, so a failed install is ignored.
pub fn init(explicit: Option<&str>, verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter_directives(explicit, verbose)))
        .try_init();
}
