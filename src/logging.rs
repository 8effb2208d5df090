//! Logging initialization

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// RUST_LOG takes precedence; otherwise verbosity follows the flags.
pub fn init(verbose: bool, debug: bool) {
    let filter = if verbose || debug {
        "rubberduck=debug,info"
    } else {
        "rubberduck=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
