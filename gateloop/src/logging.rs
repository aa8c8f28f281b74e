//! Diagnostic tracing for the controller.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is never
//! persisted; the durable record of a run is the set of loop artifacts under
//! `.gateloop/loops/<id>/` written by `io::iteration_log`, which do not depend
//! on the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Level used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber (compact, stderr).
///
/// ```bash
/// RUST_LOG=gateloop=debug gateloop run --loop main
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
