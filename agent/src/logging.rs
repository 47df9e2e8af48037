//! Operator-facing tracing for agent runs.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: stage progress and diagnostics via `RUST_LOG`,
//!   output to stderr so it lands in the CI job log.
//!
//! - **Artifacts (`io/artifacts`)**: plan, failed patch and report files
//!   consumed by the PR creator. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `agent=info,warn` so stage progress is
/// visible in CI without extra setup.
///
/// # Example
/// ```bash
/// RUST_LOG=agent=debug agent run
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
