use anyhow::bail;
use measure::metrics;
use measure::session::{Session, SessionOptions, SessionSettings};
use measure::{clienv, shutdown, MeasureConfig};

use crate::args::MetricKind;

pub(crate) async fn cmd_emit(
    config: MeasureConfig,
    kind: MetricKind,
    name: &str,
    value: Option<f64>,
) -> anyhow::Result<()> {
    if value.is_none() && matches!(kind, MetricKind::Gauge | MetricKind::Distribution) {
        bail!("A value is required for gauge and distribution metrics");
    }

    let registry = metrics::global();
    let options = SessionOptions::from_config(&config, config.tags.clone());
    let session = Session::start(options, &SessionSettings::from_env(), registry).await;

    match kind {
        MetricKind::Gauge => registry.gauge(name, value.unwrap_or_default(), &[]),
        MetricKind::Increment => registry.increment(name, count(value), &[]),
        MetricKind::Decrement => registry.decrement(name, count(value), &[]),
        MetricKind::Distribution => registry.distribution(name, value.unwrap_or_default(), &[]),
    }

    shutdown::flush_and_wait(
        registry,
        config.flush_grace(),
        clienv::is_disposable_container(),
    )
    .await;

    if session.is_connected() {
        tracing::debug!(name, "Metric sent");
    }
    Ok(())
}

fn count(value: Option<f64>) -> i64 {
    value.map(|v| v.round() as i64).unwrap_or(1)
}
