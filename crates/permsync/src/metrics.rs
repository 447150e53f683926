//! Metric emission for the permissions syncer.
//!
//! Metrics are emitted as structured events through a process-wide sink. The
//! default sink logs via tracing (target `"metrics"`); exporters and tests
//! install their own sink with [`set_sink`]. Metric names carry the
//! `src_repoupdater` namespace/subsystem prefix.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

/// Gauge: records (by `type`) that have no permissions at all.
pub const NO_PERMS: &str = "src_repoupdater_perms_syncer_no_perms";
/// Gauge: records (by `type`) whose permissions are older than the cutoff.
pub const STALE_PERMS: &str = "src_repoupdater_perms_syncer_stale_perms";
/// Gauge: seconds between the least and most recently updated rows.
pub const PERMS_GAP_SECONDS: &str = "src_repoupdater_perms_syncer_perms_gap_seconds";
/// Gauge: number of entries in the sync request queue.
pub const QUEUE_SIZE: &str = "src_repoupdater_perms_syncer_queue_size";
/// Counter: total permissions sync failures.
pub const SYNC_ERRORS_TOTAL: &str = "src_repoupdater_perms_syncer_sync_errors_total";
/// Histogram: time spent on a single permissions sync.
pub const SYNC_DURATION_SECONDS: &str = "src_repoupdater_perms_syncer_sync_duration_seconds";

/// Upper bounds (seconds) of the sync-duration histogram buckets.
pub const SYNC_DURATION_BUCKETS: [f64; 7] = [1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0];

#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram(f64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
    pub labels: Vec<MetricLabel>,
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, event: MetricEvent) {
        match event.value {
            MetricValue::Counter(value) => {
                tracing::info!(
                    target: "metrics",
                    metric = event.name,
                    value,
                    labels = ?event.labels
                );
            }
            MetricValue::Gauge(value) => {
                tracing::info!(
                    target: "metrics",
                    metric = event.name,
                    value,
                    labels = ?event.labels
                );
            }
            MetricValue::Histogram(value) => {
                tracing::info!(
                    target: "metrics",
                    metric = event.name,
                    value,
                    labels = ?event.labels
                );
            }
        }
    }
}

static METRIC_SINK: OnceLock<RwLock<Arc<dyn MetricSink>>> = OnceLock::new();

fn sink_lock() -> &'static RwLock<Arc<dyn MetricSink>> {
    METRIC_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)))
}

fn sink() -> Arc<dyn MetricSink> {
    sink_lock()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Install a metric sink, replacing the default tracing sink.
pub fn set_sink(sink: Arc<dyn MetricSink>) {
    *sink_lock().write().unwrap_or_else(|e| e.into_inner()) = sink;
}

fn emit(name: &'static str, value: MetricValue, labels: Vec<MetricLabel>) {
    sink().record(MetricEvent { name, value, labels });
}

fn type_label(kind: &str) -> MetricLabel {
    MetricLabel {
        key: "type",
        value: kind.to_string(),
    }
}

/// Pick the histogram bucket label for a duration in seconds.
fn bucket_label(seconds: f64) -> String {
    for bound in SYNC_DURATION_BUCKETS {
        if seconds <= bound {
            return format!("{bound}");
        }
    }
    "+Inf".to_string()
}

/// Record how long one permissions sync took.
pub fn observe_sync_duration(kind: &str, success: bool, duration: Duration) {
    let seconds = duration.as_secs_f64();
    emit(
        SYNC_DURATION_SECONDS,
        MetricValue::Histogram(seconds),
        vec![
            type_label(kind),
            MetricLabel {
                key: "success",
                value: success.to_string(),
            },
            MetricLabel {
                key: "le",
                value: bucket_label(seconds),
            },
        ],
    );
}

/// Count one failed permissions sync.
pub fn inc_sync_errors(kind: &str) {
    emit(
        SYNC_ERRORS_TOTAL,
        MetricValue::Counter(1),
        vec![type_label(kind)],
    );
}

/// Report the current queue size.
pub fn set_queue_size(size: usize) {
    emit(QUEUE_SIZE, MetricValue::Gauge(size as f64), Vec::new());
}

/// Report how many records of a kind have no permissions.
pub fn set_no_perms(kind: &str, count: usize) {
    emit(
        NO_PERMS,
        MetricValue::Gauge(count as f64),
        vec![type_label(kind)],
    );
}

/// Report how many records of a kind have stale permissions.
pub fn set_stale_perms(kind: &str, count: u64) {
    emit(
        STALE_PERMS,
        MetricValue::Gauge(count as f64),
        vec![type_label(kind)],
    );
}

/// Report the perms gap for a kind.
pub fn set_perms_gap_seconds(kind: &str, seconds: f64) {
    emit(
        PERMS_GAP_SECONDS,
        MetricValue::Gauge(seconds),
        vec![type_label(kind)],
    );
}
