//! Tracing subscriber setup.

use cable_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter directive used when `RUST_LOG` is unset.
pub fn filter_directive(settings: &LoggingSettings) -> String {
    let level = settings.level.trim();
    if level.is_empty() {
        "info".to_owned()
    } else {
        level.to_lowercase()
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(settings: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(settings)));

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).init();
}
