//! Log output for the command line.
//!
//! Everything goes to stderr; stdout is reserved for command output (JSON
//! records, paths) so it can be piped.

use tracing_subscriber::EnvFilter;

/// Level for our own crates given the `-v`/`-q` flags.
fn level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

/// Directives used when `RUST_LOG` isn't set. SQLx logs every statement, which
/// is only wanted at the highest verbosity.
fn directives(verbose: u8, quiet: bool) -> String {
    let level = level(verbose, quiet);
    match level {
        "trace" => level.to_string(),
        _ => format!("{level},sqlx=warn"),
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over the flags.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(verbose, quiet)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();
}
