pub mod metric_def;

use crate::metrics::metric_def::list_all_metrics;
use crate::sys_utils::sys::hostname;

use metrics::{
    describe_counter, describe_gauge, describe_histogram, histogram, Counter, Gauge, Histogram,
    IntoLabels,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

/// Histogram buckets in microseconds, from 100us to 10s.
static LATENCY_BUCKETS: &[f64; 26] = &[
    1e+2, 2e+2, 4e+2, 6e+2, 8e+2, 1e+3, 2e+3, 4e+3, 6e+3, 8e+3, 1e+4, 2e+4, 4e+4, 6e+4, 8e+4, 1e+5,
    2e+5, 4e+5, 6e+5, 8e+5, 1e+6, 2e+6, 4e+6, 6e+6, 8e+6, 1e+7,
];

const LATENCY_QUANTILES: &[f64; 7] = &[0.0, 0.5, 0.9, 0.95, 0.99, 0.999, 1.0];

pub type Labels = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy)]
pub enum MetricType {
    Gauge,
    Counter,
    Histogram,
}

static PROMETHEUS_HANDLE: RwLock<Option<PrometheusHandle>> = parking_lot::const_rwlock(None);

/// Installs the process wide prometheus recorder. Only the first call does anything.
pub fn init_metrics_context() {
    static START: Once = Once::new();
    START.call_once(|| match install_recorder() {
        Ok(()) => info!("MySrv init prometheus metrics context successfully!"),
        Err(e) => warn!("MySrv init prometheus metrics context error.cause by {e}"),
    })
}

fn build_recorder() -> Result<PrometheusRecorder, BuildError> {
    Ok(PrometheusBuilder::new()
        .set_quantiles(LATENCY_QUANTILES)?
        .set_buckets(LATENCY_BUCKETS)?
        .build_recorder())
}

fn install_recorder() -> Result<(), String> {
    let recorder = build_recorder().map_err(|e| e.to_string())?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| e.to_string())?;
    *PROMETHEUS_HANDLE.write() = Some(handle);
    for metric in list_all_metrics().iter() {
        let (name, desc, _, metric_type) = metric.get_metrics_pair();
        describe_metrics(*metric_type, name, desc);
    }
    Ok(())
}

/// The handle that renders the scrape page, once the recorder is installed.
pub fn try_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.read().clone()
}

/// Records the time between its creation and its drop into a histogram, in microseconds.
pub struct MetricsTimer {
    start: coarsetime::Instant,
    histogram: Histogram,
}

impl fmt::Debug for MetricsTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsTimer")
            .field("start", &self.start)
            .finish()
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        self.histogram.record(self.elapsed() as f64);
    }
}

impl MetricsTimer {
    pub fn new_with_labels<L: IntoLabels>(name: &'static str, labels: L) -> Self {
        Self {
            start: coarsetime::Instant::now(),
            histogram: histogram!(name, labels),
        }
    }

    pub fn elapsed(&self) -> u64 {
        self.start.elapsed().as_micros()
    }
}

/// `node_name` label attached to every series of this process.
pub fn common_labels() -> &'static Labels {
    static COMMON_LABELS: OnceLock<Labels> = OnceLock::new();
    COMMON_LABELS.get_or_init(|| vec![("node_name", hostname())])
}

fn gauge_of(name: &'static str, labels: Option<&Labels>) -> Gauge {
    match labels {
        Some(labels) => metrics::gauge!(name, labels),
        None => metrics::gauge!(name),
    }
}

fn counter_of(name: &'static str, labels: Option<&Labels>) -> Counter {
    match labels {
        Some(labels) => metrics::counter!(name, labels),
        None => metrics::counter!(name),
    }
}

#[inline]
pub fn gauge_inc(name: &'static str, value: f64, labels: Option<&Labels>) {
    gauge_of(name, labels).increment(value);
}

#[inline]
pub fn gauge_dec(name: &'static str, value: f64, labels: Option<&Labels>) {
    gauge_of(name, labels).decrement(value);
}

#[inline]
pub fn counter_inc(name: &'static str, value: u64, labels: Option<&Labels>) {
    counter_of(name, labels).increment(value);
}

pub fn describe_metrics(metric_type: MetricType, name: &'static str, desc: &'static str) {
    match metric_type {
        MetricType::Gauge => describe_gauge!(name, desc),
        MetricType::Counter => describe_counter!(name, desc),
        MetricType::Histogram => describe_histogram!(name, desc),
    }
}
