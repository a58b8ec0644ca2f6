//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_journals_persisted_total` - Journals whose write phase committed
//! - `ledger_journal_rejections_total{reason}` - Failed persistence attempts by error kind
//! - `ledger_persist_duration_seconds` - Histogram of persist/commit latencies
//! - `ledger_transactions_persisted_total` - Postings written
//! - `ledger_journals_staged` - Journals waiting for commit (deferred mode)
//!
//! Collectors are registered in the instance registry only, so several ledgers
//! can live in one process.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::{fmt, sync::Arc};

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Journals committed
    pub journals_persisted: IntCounter,

    /// Rejections by reason
    pub journal_rejections: IntCounterVec,

    /// Persist duration histogram
    pub persist_duration: Histogram,

    /// Postings written
    pub transactions_persisted: IntCounter,

    /// Journals staged for a deferred commit
    pub journals_staged: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let journals_persisted = IntCounter::new(
            "ledger_journals_persisted_total",
            "Total number of journals persisted",
        )?;
        registry.register(Box::new(journals_persisted.clone()))?;

        let journal_rejections = IntCounterVec::new(
            Opts::new(
                "ledger_journal_rejections_total",
                "Total number of journals rejected, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(journal_rejections.clone()))?;

        let persist_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_persist_duration_seconds",
                "Histogram of journal persistence latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(persist_duration.clone()))?;

        let transactions_persisted = IntCounter::new(
            "ledger_transactions_persisted_total",
            "Total number of transactions persisted",
        )?;
        registry.register(Box::new(transactions_persisted.clone()))?;

        let journals_staged = IntGauge::new(
            "ledger_journals_staged",
            "Journals staged and awaiting commit",
        )?;
        registry.register(Box::new(journals_staged.clone()))?;

        Ok(Self {
            journals_persisted,
            journal_rejections,
            persist_duration,
            transactions_persisted,
            journals_staged,
            registry,
        })
    }

    /// Record a committed journal and its postings
    pub fn record_journal_persisted(&self, transactions: usize) {
        self.journals_persisted.inc();
        self.transactions_persisted.inc_by(transactions as u64);
    }

    /// Record a rejected journal
    pub fn record_rejection(&self, reason: &str) {
        self.journal_rejections.with_label_values(&[reason]).inc();
    }

    /// Record persist duration
    pub fn record_persist_duration(&self, duration_seconds: f64) {
        self.persist_duration.observe(duration_seconds);
    }

    /// Update the staged journal count
    pub fn update_staged(&self, staged: usize) {
        self.journals_staged.set(staged as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode_text(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| crate::Error::Storage(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| crate::Error::Storage(format!("Metrics are not UTF-8: {}", e)))
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("journals_persisted", &self.journals_persisted.get())
            .field("transactions_persisted", &self.transactions_persisted.get())
            .field("journals_staged", &self.journals_staged.get())
            .finish_non_exhaustive()
    }
}
