//! In-process metrics registry: `Counter`, `Histogram`, `Gauge`.
//!
//! Generalizes `aivcs-core::metrics::METRICS` (a handful of bare
//! `AtomicU64` fields flushed via `tracing::info!`) into the three typed
//! primitives the wider system needs, keeping the same "atomic, lock-
//! protected, tracing-integrated" idiom.

use std::collections::HashMap;

use parking_lot::Mutex;

const DEFAULT_HISTOGRAM_CAPACITY: usize = 10_000;
const DEFAULT_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

#[derive(Default)]
struct CounterInner {
    value: u64,
    labeled: HashMap<String, u64>,
}

/// Unlabeled total plus a labeled breakdown, keyed by a flattened
/// `"k1=v1,k2=v2"` string (matching the `function=...,attempt=...` key
/// shape used by the retry decorator).
pub struct Counter(Mutex<CounterInner>);

impl Default for Counter {
    fn default() -> Self {
        Self(Mutex::new(CounterInner::default()))
    }
}

impl Counter {
    pub fn inc(&self) {
        self.0.lock().value += 1;
    }

    pub fn inc_labeled(&self, labels: &str) {
        let mut guard = self.0.lock();
        guard.value += 1;
        *guard.labeled.entry(labels.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self) -> u64 {
        self.0.lock().value
    }

    pub fn get_labeled(&self, labels: &str) -> u64 {
        self.0.lock().labeled.get(labels).copied().unwrap_or(0)
    }
}

struct HistogramInner {
    observations: std::collections::VecDeque<f64>,
    capacity: usize,
    buckets: Vec<f64>,
}

pub struct HistogramStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub bucket_counts_le: Vec<(f64, u64)>,
}

/// Sliding observation buffer; statistics are computed on demand rather
/// than maintained incrementally, since reads are far rarer than writes.
pub struct Histogram(Mutex<HistogramInner>);

impl Histogram {
    pub fn new(capacity: usize, buckets: Vec<f64>) -> Self {
        Self(Mutex::new(HistogramInner {
            observations: std::collections::VecDeque::with_capacity(capacity),
            capacity,
            buckets,
        }))
    }

    pub fn observe(&self, value: f64) {
        let mut guard = self.0.lock();
        if guard.observations.len() >= guard.capacity {
            guard.observations.pop_front();
        }
        guard.observations.push_back(value);
    }

    pub fn stats(&self) -> HistogramStats {
        let guard = self.0.lock();
        let count = guard.observations.len() as u64;
        let sum: f64 = guard.observations.iter().sum();
        let min = guard.observations.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = guard
            .observations
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let avg = if count > 0 { sum / count as f64 } else { 0.0 };
        let bucket_counts_le = guard
            .buckets
            .iter()
            .map(|&bound| {
                let n = guard.observations.iter().filter(|&&v| v <= bound).count() as u64;
                (bound, n)
            })
            .collect();

        HistogramStats {
            count,
            sum,
            min: if count > 0 { min } else { 0.0 },
            max: if count > 0 { max } else { 0.0 },
            avg,
            bucket_counts_le,
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_CAPACITY, DEFAULT_BUCKETS.to_vec())
    }
}

/// A single float with `set/inc/dec/get`.
pub struct Gauge(Mutex<f64>);

impl Default for Gauge {
    fn default() -> Self {
        Self(Mutex::new(0.0))
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        *self.0.lock() = value;
    }

    pub fn inc(&self, delta: f64) {
        *self.0.lock() += delta;
    }

    pub fn dec(&self, delta: f64) {
        *self.0.lock() -= delta;
    }

    pub fn get(&self) -> f64 {
        *self.0.lock()
    }
}

/// Process-wide registry. One of these is expected to back a singleton
/// accessor in the binary crates; kept constructible here so tests and
/// library consumers can hold their own instance.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<String, std::sync::Arc<Counter>>>,
    histograms: Mutex<HashMap<String, std::sync::Arc<Histogram>>>,
    gauges: Mutex<HashMap<String, std::sync::Arc<Gauge>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> std::sync::Arc<Counter> {
        self.counters
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Counter::default()))
            .clone()
    }

    pub fn histogram(&self, name: &str) -> std::sync::Arc<Histogram> {
        self.histograms
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Histogram::default()))
            .clone()
    }

    pub fn gauge(&self, name: &str) -> std::sync::Arc<Gauge> {
        self.gauges
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Gauge::default()))
            .clone()
    }

    /// Emits one `tracing::info!` line per registered metric, mirroring
    /// `aivcs-core::metrics::Metrics::flush`.
    pub fn flush(&self) {
        for (name, counter) in self.counters.lock().iter() {
            tracing::info!(metric = %name, kind = "counter", value = counter.get(), "metric flush");
        }
        for (name, histogram) in self.histograms.lock().iter() {
            let stats = histogram.stats();
            tracing::info!(metric = %name, kind = "histogram", count = stats.count, avg = stats.avg, "metric flush");
        }
        for (name, gauge) in self.gauges.lock().iter() {
            tracing::info!(metric = %name, kind = "gauge", value = gauge.get(), "metric flush");
        }
    }

    pub fn reset(&self) {
        self.counters.lock().clear();
        self.histograms.lock().clear();
        self.gauges.lock().clear();
    }

    /// Name-sorted snapshots for callers rendering the registry (e.g. the
    /// CLI's `/metrics` table) rather than just logging it via [`flush`].
    pub fn counters_snapshot(&self) -> Vec<(String, u64)> {
        let mut rows: Vec<_> = self.counters.lock().iter().map(|(name, c)| (name.clone(), c.get())).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn histograms_snapshot(&self) -> Vec<(String, HistogramStats)> {
        let mut rows: Vec<_> = self.histograms.lock().iter().map(|(name, h)| (name.clone(), h.stats())).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn gauges_snapshot(&self) -> Vec<(String, f64)> {
        let mut rows: Vec<_> = self.gauges.lock().iter().map(|(name, g)| (name.clone(), g.get())).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_labeled_and_total() {
        let c = Counter::default();
        c.inc();
        c.inc_labeled("function=f,attempt=1");
        c.inc_labeled("function=f,attempt=1");
        assert_eq!(c.get(), 3);
        assert_eq!(c.get_labeled("function=f,attempt=1"), 2);
        assert_eq!(c.get_labeled("function=f,attempt=2"), 0);
    }

    #[test]
    fn histogram_computes_bucket_counts() {
        let h = Histogram::new(100, vec![1.0, 5.0, 10.0]);
        for v in [0.5, 2.0, 7.0, 20.0] {
            h.observe(v);
        }
        let stats = h.stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.bucket_counts_le, vec![(1.0, 1), (5.0, 2), (10.0, 3)]);
    }

    #[test]
    fn gauge_set_inc_dec() {
        let g = Gauge::default();
        g.set(10.0);
        g.inc(5.0);
        g.dec(2.0);
        assert_eq!(g.get(), 13.0);
    }
}
