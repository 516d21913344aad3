//! Tracing initialisation for fixloop binaries.
//!
//! `RUST_LOG` wins when set; otherwise the given level applies to fixloop
//! crates and HTTP client internals stay at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directives for `level`.
pub fn default_directives(level: Level) -> String {
    format!("{},hyper=warn,reqwest=warn,h2=warn", level.as_str().to_ascii_lowercase())
}

/// Install the global subscriber. Only the first call takes effect.
///
/// `json` switches to newline-delimited JSON, e.g. for log shipping.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    // Logs go to stderr so stdout stays clean for the run summary.
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
