use crate::config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, describe_all, find_duplicate};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("could not install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("could not create statsd recorder: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("could not install metrics recorder: {0}")]
    Recorder(String),
}

/// Keeps the error reporting client alive. Dropping it flushes pending events.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

pub fn all_metrics() -> Vec<MetricDef> {
    [
        event_auth::metrics_defs::ALL_METRICS,
        search_index::metrics_defs::ALL_METRICS,
        ingest_store::metrics_defs::ALL_METRICS,
    ]
    .concat()
}

/// Installs logging, error reporting and, when configured, the statsd
/// metrics recorder. `RUST_LOG` takes precedence over the configured level.
pub fn init(common: &CommonConfig) -> Result<TelemetryGuard, TelemetryError> {
    let level = common
        .logging
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |logging| logging.level.as_str());
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let sentry = common
        .logging
        .as_ref()
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });
    let sentry_layer = sentry
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .try_init()?;

    if let Some(config) = &common.metrics {
        let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
            .build(Some(&config.prefix))?;
        metrics::set_global_recorder(recorder)
            .map_err(|e| TelemetryError::Recorder(e.to_string()))?;
        tracing::info!(
            host = %config.statsd_host,
            port = config.statsd_port,
            "Sending metrics to statsd"
        );
    }

    let defs = all_metrics();
    if let Some(name) = find_duplicate(&defs) {
        tracing::warn!(name, "Metric is defined more than once");
    }
    describe_all(&defs);

    Ok(TelemetryGuard { _sentry: sentry })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_unique() {
        let defs = all_metrics();
        assert_eq!(find_duplicate(&defs), None);
        assert!(defs.iter().all(|def| !def.description.is_empty()));
    }
}
