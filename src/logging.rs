use std::io;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive, e.g. `ecosentinel=debug`.
pub const LOG_ENV: &str = "ECO_LOG";

/// Installs the global stderr subscriber.
///
/// `ECO_LOG` wins when set; otherwise `verbose` selects `debug` and the
/// default keeps the CLI quiet apart from errors. Calling it twice is a no-op.
pub fn init(verbose: bool) {
    let fallback = if verbose { "ecosentinel=debug" } else { "error" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .try_init();
}
