//! Metrics collection and export module

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Process-wide client metrics
pub struct Metrics {
    registry: Registry,
    enabled: AtomicBool,

    // Counters
    pub txs_submitted: IntCounter,
    pub txs_confirmed: IntCounter,
    pub txs_failed: IntCounter,
    pub precondition_rejections: IntCounter,
    pub pool_simulations: IntCounterVec,

    // Gauges
    pub receipt_subscribers: IntGauge,
    pub pending_txs: IntGauge,

    // Histograms
    pub pool_walk_latency: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let txs_submitted = IntCounter::with_opts(Opts::new(
            "stake_txs_submitted_total",
            "Transactions submitted by staking operations",
        ))?;

        let txs_confirmed = IntCounter::with_opts(Opts::new(
            "stake_txs_confirmed_total",
            "Transactions observed mined with success status",
        ))?;

        let txs_failed = IntCounter::with_opts(Opts::new(
            "stake_txs_failed_total",
            "Transactions observed mined with failure status",
        ))?;

        let precondition_rejections = IntCounter::with_opts(Opts::new(
            "stake_precondition_rejections_total",
            "Operations rejected before submission by a chain precondition",
        ))?;

        let pool_simulations = IntCounterVec::new(
            Opts::new(
                "stake_pool_simulations_total",
                "Pool hint simulations by outcome",
            ),
            &["outcome"],
        )?;

        let receipt_subscribers = IntGauge::with_opts(Opts::new(
            "stake_receipt_subscribers",
            "Currently registered receipt subscribers",
        ))?;

        let pending_txs = IntGauge::with_opts(Opts::new(
            "stake_pending_txs",
            "Submitted transactions not yet observed mined",
        ))?;

        let pool_walk_latency = Histogram::with_opts(
            HistogramOpts::new(
                "stake_pool_walk_latency_seconds",
                "Latency of a full transcoder pool traversal",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        registry.register(Box::new(txs_submitted.clone()))?;
        registry.register(Box::new(txs_confirmed.clone()))?;
        registry.register(Box::new(txs_failed.clone()))?;
        registry.register(Box::new(precondition_rejections.clone()))?;
        registry.register(Box::new(pool_simulations.clone()))?;
        registry.register(Box::new(receipt_subscribers.clone()))?;
        registry.register(Box::new(pending_txs.clone()))?;
        registry.register(Box::new(pool_walk_latency.clone()))?;

        Ok(Self {
            registry,
            enabled: AtomicBool::new(true),
            txs_submitted,
            txs_confirmed,
            txs_failed,
            precondition_rejections,
            pool_simulations,
            receipt_subscribers,
            pending_txs,
            pool_walk_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Turn recording on or off (`monitoring.enable_metrics`)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// `Some(self)` while recording is enabled
    pub fn active(&self) -> Option<&Self> {
        self.is_enabled().then_some(self)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Global metrics, or `None` when recording is disabled
pub fn recorder() -> Option<&'static Metrics> {
    metrics().active()
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
