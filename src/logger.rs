//! Tracing subscriber setup for binaries and benches.
//!
//! The library only emits events; installing a subscriber is left to the
//! host. `init_tracing` is the one used by `qrtool`.

use std::sync::OnceLock;

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

/// Whether `QR_DEBUG` is set in the environment.
pub fn debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| std::env::var("QR_DEBUG").is_ok())
}

fn default_directive() -> &'static str {
    if debug_enabled() { "debug" } else { "info" }
}

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info`, or `debug` under `QR_DEBUG`. Only the first call
/// installs anything.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive()));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false);
        init_tracing(true);
        tracing::info!("still logging");
    }
}
