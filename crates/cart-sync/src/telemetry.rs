//! Logging and error-tracking setup.
//!
//! Swallowed remote failures are logged at `warn`; with a Sentry DSN
//! configured, the Sentry tracing layer turns those into Sentry events and
//! keeps `info`/`debug` events as breadcrumbs.

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SyncConfig;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "kushie_cart_sync=info";

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the global tracing subscriber and, when configured, Sentry.
///
/// Call once at startup and keep the returned guard alive for the lifetime
/// of the process. Calling again after a subscriber is installed is harmless.
pub fn init(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    // Initialize Sentry first so the tracing layer has a client to report to
    let guard = init_sentry(config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_dsn_returns_no_guard() {
        let config = SyncConfig::default();
        assert!(init(&config).is_none());
        // Second call must not panic.
        assert!(init(&config).is_none());
    }
}
