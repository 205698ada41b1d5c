// tests/metrics.rs
use std::sync::Arc;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use parcel_tracker::format::parse_timezone;
use parcel_tracker::{
    run_cycle, LogNotifier, PollerDeps, Result, Snapshot, TrackError, TrackingApi, Watch,
    WatchStore,
};

struct OneWatch;

#[async_trait]
impl WatchStore for OneWatch {
    async fn list_all(&self) -> Result<Vec<Watch>> {
        Ok(vec![Watch::new(1, "A1"), Watch::new(1, "B2")])
    }
    async fn list_by_user(&self, _: i64) -> Result<Vec<Watch>> {
        Ok(vec![])
    }
    async fn upsert(&self, _: i64, _: &str, _: Option<&str>, _: Option<&str>) -> Result<()> {
        Ok(())
    }
    async fn update_state(&self, _: i64, _: &str, _: &str, _: Option<&str>) -> Result<()> {
        Ok(())
    }
    async fn remove(&self, _: i64, _: &str) -> Result<usize> {
        Ok(1)
    }
}

struct HalfBroken;

#[async_trait]
impl TrackingApi for HalfBroken {
    async fn import_tracking(&self, _: &str, _: Option<&str>) -> Result<()> {
        Ok(())
    }
    async fn query_tracking(&self, tn: &str, _: Option<&str>) -> Result<Snapshot> {
        if tn == "B2" {
            return Err(TrackError::Transport {
                status: 502,
                body: String::new(),
            });
        }
        Ok(Snapshot::unknown(tn, None))
    }
    async fn delete_tracking(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }
}

#[test]
fn poll_cycle_emits_expected_series() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    let deps = PollerDeps {
        store: Arc::new(OneWatch),
        api: Arc::new(HalfBroken),
        notifier: Arc::new(LogNotifier),
        timezone: parse_timezone("UTC"),
    };

    // The local recorder is thread-scoped: run the cycle on a current-thread
    // runtime inside the closure.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let report = metrics::with_local_recorder(&recorder, || {
        parcel_tracker::metrics::describe();
        rt.block_on(run_cycle(&deps))
    });
    assert_eq!(report.failed, 1);
    assert_eq!(report.notified, 1);

    let text = handle.render();
    for needle in [
        "poll_cycles_total 1",
        "poll_watch_failures_total 1",
        "poll_notifications_total 1",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }
}
