//! # Metrics Collection
//!
//! Prometheus-compatible counters for the control loop:
//!
//! - **Counters**: sampling ticks, fired events, reasoner runs, resets
//! - **Gauges**: node degree, transmit-power index, battery level
//! - **Histograms**: reasoner latency
//!
//! ## Example
//!
//! ```rust
//! use ora_core::observe::ControlMetrics;
//!
//! let metrics = ControlMetrics::new();
//! metrics.ticks.inc();
//! metrics.node_degree.set(4);
//! metrics.reasoner_latency_us.observe(120.0);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.ticks, 1);
//! assert!(metrics.to_prometheus().contains("ora_node_degree 4"));
//! ```

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Histogram with fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    boundaries: Vec<f64>,
    /// len = boundaries.len() + 1; the last bucket is overflow
    buckets: Vec<AtomicU64>,
    /// Sum in thousandths
    sum_milli: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency_us()
    }
}

impl Histogram {
    pub fn new(boundaries: Vec<f64>) -> Self {
        let num_buckets = boundaries.len() + 1;
        Self {
            boundaries,
            buckets: (0..num_buckets).map(|_| AtomicU64::new(0)).collect(),
            sum_milli: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets for microsecond latencies.
    pub fn latency_us() -> Self {
        Self::new(vec![
            10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 50000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| value < b)
            .unwrap_or(self.boundaries.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_milli
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }
}

/// Control loop metrics shared by the trigger policy, reasoner and actuator.
#[derive(Debug, Default)]
pub struct ControlMetrics {
    /// Sampling instants processed
    pub ticks: Counter,
    /// Triggers fired (any cause)
    pub fires: Counter,
    /// Triggers fired on node-degree error
    pub nd_events: Counter,
    /// Triggers fired on battery error
    pub bl_events: Counter,
    /// Samples whose error stayed inside the deadband
    pub suppressed: Counter,
    /// Ticks that failed to sample or trigger
    pub tick_failures: Counter,
    /// Completed reasoner runs
    pub reasoner_runs: Counter,
    /// Transmit-power updates applied
    pub action_invocations: Counter,
    /// Controller history resets
    pub resets: Counter,

    pub node_degree: Gauge,
    pub cr_index: Gauge,
    /// Battery level * 1000
    pub battery_level_x1000: Gauge,

    pub reasoner_latency_us: Histogram,
}

impl ControlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_battery_level(&self, level: f64) {
        self.battery_level_x1000.set((level * 1000.0) as i64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.get(),
            fires: self.fires.get(),
            nd_events: self.nd_events.get(),
            bl_events: self.bl_events.get(),
            suppressed: self.suppressed.get(),
            tick_failures: self.tick_failures.get(),
            reasoner_runs: self.reasoner_runs.get(),
            action_invocations: self.action_invocations.get(),
            resets: self.resets.get(),
            node_degree: self.node_degree.get(),
            cr_index: self.cr_index.get(),
            battery_level: self.battery_level_x1000.get() as f64 / 1000.0,
            reasoner_latency_count: self.reasoner_latency_us.count(),
            reasoner_latency_sum_us: self.reasoner_latency_us.sum(),
        }
    }

    /// Zero all counters; gauges keep their last value.
    pub fn reset(&self) {
        for c in [
            &self.ticks,
            &self.fires,
            &self.nd_events,
            &self.bl_events,
            &self.suppressed,
            &self.tick_failures,
            &self.reasoner_runs,
            &self.action_invocations,
            &self.resets,
        ] {
            c.reset();
        }
    }

    /// Export in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        let counters = [
            ("ticks_total", "Sampling instants processed", s.ticks),
            ("trigger_fires_total", "Triggers fired", s.fires),
            ("nd_events_total", "Node-degree events fired", s.nd_events),
            ("bl_events_total", "Battery-level events fired", s.bl_events),
            ("suppressed_total", "Samples inside the deadband", s.suppressed),
            ("tick_failures_total", "Ticks that failed", s.tick_failures),
            ("reasoner_runs_total", "Completed reasoner runs", s.reasoner_runs),
            ("action_invocations_total", "Transmit-power updates applied", s.action_invocations),
            ("resets_total", "Controller history resets", s.resets),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP ora_{name} {help}");
            let _ = writeln!(out, "# TYPE ora_{name} counter");
            let _ = writeln!(out, "ora_{name} {value}");
        }

        let _ = writeln!(out, "# HELP ora_node_degree Current node degree");
        let _ = writeln!(out, "# TYPE ora_node_degree gauge");
        let _ = writeln!(out, "ora_node_degree {}", s.node_degree);
        let _ = writeln!(out, "# HELP ora_cr_index Current transmit-power index");
        let _ = writeln!(out, "# TYPE ora_cr_index gauge");
        let _ = writeln!(out, "ora_cr_index {}", s.cr_index);
        let _ = writeln!(out, "# HELP ora_battery_level Available battery capacity");
        let _ = writeln!(out, "# TYPE ora_battery_level gauge");
        let _ = writeln!(out, "ora_battery_level {}", s.battery_level);

        let _ = writeln!(out, "# HELP ora_reasoner_latency_us Reasoner run time");
        let _ = writeln!(out, "# TYPE ora_reasoner_latency_us summary");
        let _ = writeln!(out, "ora_reasoner_latency_us_sum {}", s.reasoner_latency_sum_us);
        let _ = writeln!(out, "ora_reasoner_latency_us_count {}", s.reasoner_latency_count);

        out
    }
}

/// Point-in-time copy of [`ControlMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub fires: u64,
    pub nd_events: u64,
    pub bl_events: u64,
    pub suppressed: u64,
    pub tick_failures: u64,
    pub reasoner_runs: u64,
    pub action_invocations: u64,
    pub resets: u64,
    pub node_degree: i64,
    pub cr_index: i64,
    pub battery_level: f64,
    pub reasoner_latency_count: u64,
    pub reasoner_latency_sum_us: f64,
}

impl MetricsSnapshot {
    pub fn avg_reasoner_latency_us(&self) -> f64 {
        if self.reasoner_latency_count == 0 {
            0.0
        } else {
            self.reasoner_latency_sum_us / self.reasoner_latency_count as f64
        }
    }

    /// Share of ticks that fired a trigger.
    pub fn fire_rate(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.fires as f64 / self.ticks as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_gauge() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(9);
        assert_eq!(counter.get(), 10);
        counter.reset();
        assert_eq!(counter.get(), 0);

        let gauge = Gauge::new();
        gauge.set(5);
        gauge.add(-7);
        assert_eq!(gauge.get(), -2);
    }

    #[test]
    fn test_histogram_buckets() {
        let hist = Histogram::new(vec![10.0, 100.0]);
        hist.observe(1.0);
        hist.observe(10.0);
        hist.observe(1000.0);
        assert_eq!(hist.count(), 3);
        assert_eq!(hist.bucket_counts(), vec![1, 1, 1]);
        assert!((hist.sum() - 1011.0).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_and_rates() {
        let metrics = ControlMetrics::new();
        metrics.ticks.inc_by(4);
        metrics.fires.inc();
        metrics.record_battery_level(512.25);
        metrics.reasoner_latency_us.observe(100.0);
        metrics.reasoner_latency_us.observe(300.0);

        let s = metrics.snapshot();
        assert_eq!(s.fire_rate(), 0.25);
        assert!((s.battery_level - 512.25).abs() < 1e-9);
        assert!((s.avg_reasoner_latency_us() - 200.0).abs() < 0.01);

        metrics.reset();
        assert_eq!(metrics.snapshot().ticks, 0);
        assert_eq!(metrics.snapshot().battery_level, s.battery_level);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = ControlMetrics::new();
        metrics.nd_events.inc_by(3);
        metrics.cr_index.set(7);

        let out = metrics.to_prometheus();
        assert!(out.contains("# TYPE ora_nd_events_total counter"));
        assert!(out.contains("ora_nd_events_total 3"));
        assert!(out.contains("ora_cr_index 7"));
    }
}
