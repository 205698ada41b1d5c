// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. With `listen`, `/metrics` is
    /// also served over HTTP from a background task (needs a tokio runtime).
    pub fn init(listen: Option<SocketAddr>) -> Result<Self> {
        let handle = match listen {
            None => PrometheusBuilder::new().install_recorder()?,
            Some(addr) => {
                let (recorder, exporter) =
                    PrometheusBuilder::new().with_http_listener(addr).build()?;
                let handle = recorder.handle();
                metrics::set_global_recorder(recorder)
                    .map_err(|e| anyhow!("set metrics recorder: {e}"))?;
                tokio::spawn(async move {
                    if let Err(e) = exporter.await {
                        tracing::error!(error = ?e, "metrics exporter stopped");
                    }
                });
                tracing::info!(%addr, "prometheus exporter listening");
                handle
            }
        };
        describe();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register help text for every series the crate emits.
pub fn describe() {
    describe_counter!(
        "upstream_requests_total",
        "HTTP requests sent to the tracking aggregator, per endpoint"
    );
    describe_counter!(
        "upstream_retries_total",
        "Upstream attempts that failed and were scheduled for retry"
    );
    describe_counter!(
        "upstream_failures_total",
        "Upstream calls that failed after the retry policy gave up"
    );
    describe_gauge!("limiter_queue_depth", "Tasks waiting in the rate limiter queue");
    describe_counter!("poll_cycles_total", "Completed poll cycles");
    describe_counter!(
        "poll_watch_failures_total",
        "Watches whose poll failed within a cycle"
    );
    describe_counter!(
        "poll_notifications_total",
        "Change notifications sent by the poller"
    );
    describe_counter!(
        "poll_terminal_removed_total",
        "Watches removed after reaching a terminal state"
    );
}
