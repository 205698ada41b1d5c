//! Parcel tracker: long-running poller process.
//!
//! Loads config, opens the watch store, and polls the tracking aggregator on a
//! fixed interval until Ctrl-C. The in-flight cycle is allowed to finish.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use parcel_tracker::metrics::Metrics;
use parcel_tracker::telemetry::init_tracing;
use parcel_tracker::{
    AppConfig, JsonWatchStore, LogNotifier, Notifier, Poller, PollerDeps, UpstreamClient,
    WebhookNotifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load().context("loading configuration")?;
    init_tracing(&cfg.log_level);

    let _metrics = Metrics::init(cfg.metrics_addr).context("installing metrics recorder")?;

    let store = JsonWatchStore::open(&cfg.db_path)
        .await
        .context("opening watch store")?;
    let client = UpstreamClient::from_config(&cfg).context("building upstream client")?;
    let notifier: Arc<dyn Notifier> = match &cfg.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    info!(
        store = %store.path().display(),
        interval_secs = cfg.poll_interval.as_secs(),
        max_rps = cfg.max_rps,
        max_concurrency = cfg.max_concurrency,
        "parcel tracker starting"
    );

    let poller = Poller::start(
        PollerDeps {
            store: Arc::new(store),
            api: Arc::new(client),
            notifier,
            timezone: cfg.display_zone(),
        },
        cfg.poll_interval,
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested, waiting for in-flight cycle");
    poller.stop();
    poller.join().await;
    info!("bye");
    Ok(())
}
