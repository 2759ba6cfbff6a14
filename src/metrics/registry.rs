use super::Observer;
use crate::bench::config::BenchConfig;
use crate::connection::pool::PoolStats;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const ATTEMPT_BUCKETS: &[f64] = &[
    1., 2., 3., 4., 5., 6., 7., 8., 9.,
    10., 20., 30., 40., 50., 60., 70., 80., 90.,
];

const RESTART_BUCKETS: &[f64] = &[
    0., 1., 2., 3., 4., 5., 6., 7., 8., 9.,
    10., 20., 30., 40., 50., 60., 70., 80., 90.,
];

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.002, 0.003, 0.004, 0.005, 0.006, 0.007, 0.008, 0.009,
    0.01, 0.02, 0.03, 0.04, 0.05, 0.06, 0.07, 0.08, 0.09,
    0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9,
    1., 2., 3., 4., 5., 6., 7., 8., 9.,
    10., 20., 30., 40., 50., 60.,
];

/// Fixed-bucket histogram with lock-free observation.
pub struct Histogram {
    bounds: &'static [f64],
    /// Per-bucket counts; the extra last slot is the `+Inf` bucket.
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

/// Point-in-time copy of a histogram with cumulative buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let slot = self
            .bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bounds.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(&self.counts)
            .map(|(&bound, count)| {
                cumulative += count.load(Ordering::Relaxed);
                (bound, cumulative)
            })
            .collect();

        HistogramSnapshot {
            buckets,
            sum: f64::from_bits(self.sum_bits.load(Ordering::Relaxed)),
            count: self.count.load(Ordering::Relaxed),
        }
    }

    fn render(&self, out: &mut String, name: &str, help: &str) {
        let snapshot = self.snapshot();
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bound, count) in &snapshot.buckets {
            let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", snapshot.count);
        let _ = writeln!(out, "{name}_sum {}", snapshot.sum);
        let _ = writeln!(out, "{name}_count {}", snapshot.count);
    }
}

/// Metrics registry for one benchmark run.
pub struct BenchMetrics {
    attempts: Histogram,
    restarts: Histogram,
    latency: Histogram,
    error_codes: Mutex<BTreeMap<String, u64>>,
    flags: Vec<(&'static str, f64)>,
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchMetrics {
    pub fn new() -> Self {
        Self {
            attempts: Histogram::new(ATTEMPT_BUCKETS),
            restarts: Histogram::new(RESTART_BUCKETS),
            latency: Histogram::new(LATENCY_BUCKETS),
            error_codes: Mutex::new(BTreeMap::new()),
            flags: Vec::new(),
        }
    }

    /// Record the run configuration as one-shot `flag_info` gauges.
    pub fn with_flag_info(mut self, config: &BenchConfig) -> Self {
        let as_gauge = |flag: bool| if flag { 1.0 } else { 0.0 };
        self.flags = vec![
            ("max_conns", config.connection.max_connections as f64),
            ("think_time", config.think_time.as_secs_f64()),
            ("unique_ids", config.unique_ids as f64),
            ("select_for_update", as_gauge(config.select_for_update)),
            ("save_point", as_gauge(config.savepoint)),
            ("workers_per_id", config.workers_per_id as f64),
        ];
        self
    }

    pub fn attempts(&self) -> HistogramSnapshot {
        self.attempts.snapshot()
    }

    pub fn restarts(&self) -> HistogramSnapshot {
        self.restarts.snapshot()
    }

    pub fn latency(&self) -> HistogramSnapshot {
        self.latency.snapshot()
    }

    /// Times an error with this SQLSTATE has been classified.
    pub fn error_count(&self, code: &str) -> u64 {
        self.error_codes
            .lock()
            .map(|codes| codes.get(code).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn render(&self, pool: Option<PoolStats>) -> String {
        let mut out = String::new();

        self.attempts.render(
            &mut out,
            "worker_attempts_total",
            "the number of retries that occur within a single worker loop",
        );
        self.restarts.render(
            &mut out,
            "worker_restarts_total",
            "the number of savepoint restarts within a single worker loop",
        );
        self.latency.render(
            &mut out,
            "worker_overall_latency_seconds",
            "the overall worker latency for successful requests",
        );

        let _ = writeln!(out, "# HELP pgerror_codes_total the number of postgres errors");
        let _ = writeln!(out, "# TYPE pgerror_codes_total counter");
        if let Ok(codes) = self.error_codes.lock() {
            for (code, count) in codes.iter() {
                let _ = writeln!(out, "pgerror_codes_total{{code=\"{code}\"}} {count}");
            }
        }

        if !self.flags.is_empty() {
            let _ = writeln!(out, "# TYPE flag_info gauge");
            for (flag, value) in &self.flags {
                let _ = writeln!(out, "flag_info{{flag=\"{flag}\"}} {value}");
            }
        }

        if let Some(stats) = pool {
            let _ = writeln!(out, "# TYPE db_acquired_connection_count gauge");
            let _ = writeln!(out, "db_acquired_connection_count {}", stats.active_connections);
            let _ = writeln!(out, "# TYPE db_idle_connection_count gauge");
            let _ = writeln!(out, "db_idle_connection_count {}", stats.available_connections);
        }

        out
    }
}

impl Observer for BenchMetrics {
    fn observe_attempts(&self, attempts: u32) {
        self.attempts.observe(f64::from(attempts));
    }

    fn observe_restarts(&self, restarts: u32) {
        self.restarts.observe(f64::from(restarts));
    }

    fn observe_latency(&self, latency: Duration) {
        self.latency.observe(latency.as_secs_f64());
    }

    fn record_error_code(&self, code: &str) {
        if let Ok(mut codes) = self.error_codes.lock() {
            *codes.entry(code.to_string()).or_insert(0) += 1;
        }
    }
}
