//! Tracing subscriber setup driven by [`LoggingConfig`].

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns `false` when a subscriber was already installed, which is the
/// normal case when the host owns logging.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.format.eq_ignore_ascii_case("pretty") {
        registry.with(fmt::layer().pretty()).try_init()
    } else {
        registry.with(fmt::layer().json()).try_init()
    };
    result.is_ok()
}
