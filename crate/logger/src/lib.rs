use std::sync::Once;

use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_INIT: Once = Once::new();

/// Filter used when neither `RUST_LOG` nor a default is given
pub const DEFAULT_LOG_FILTER: &str = "info,ksema_client=info";

/// Install the global `tracing` subscriber, once per process.
///
/// The filter is read from `RUST_LOG`, falling back to `default_value`, then
/// to [`DEFAULT_LOG_FILTER`]. If another subscriber is already installed, it
/// is kept.
pub fn log_init(default_value: Option<&str>) {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(default_value.unwrap_or(DEFAULT_LOG_FILTER))
        });
        tracing_setup(filter);
    });
}

fn tracing_setup(filter: EnvFilter) {
    let format = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .compact();

    let (filter, _reload_handle) = tracing_subscriber::reload::Layer::new(filter);

    if tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .is_ok()
    {
        debug!("tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::log_init;

    #[test]
    fn test_log_init_is_idempotent() {
        log_init(Some("debug"));
        log_init(None);
        tracing::info!("logging twice does not panic");
    }
}
