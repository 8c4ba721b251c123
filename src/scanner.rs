//! One scan cycle over the configured assets.
//!
//! Every asset is attempted once and ends up in exactly one [`AssetStatus`].
//! Nothing that happens to one asset stops the others: no data, an unknown
//! symbol or a flaky backend only produce a skip entry and a log line.

use crate::benchmark::benchmark_change_pct;
use crate::classifier::classify;
use crate::config::ScanConfig;
use crate::detector::{DRAWDOWN_WINDOW_DAYS, detect_peak_drop};
use crate::error::{AppError, Result};
use crate::models::{PriceSeries, Signal, SignalKind, SignalPayload};
use crate::price_source::{AttemptOutcome, PriceSource, SourceOutcome};
use crate::store::SignalStore;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info, warn};

/// Cooperative cancellation, checked before each asset starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No backend knew the symbol.
    Unresolved,
    /// Backends answered with errors; one reason per attempt.
    NoData(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetStatus {
    Signalled,
    /// Data was fine, nothing crossed the threshold.
    Quiet,
    Skipped(SkipReason),
    /// Not attempted because the scan was cancelled first.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetOutcome {
    pub asset: String,
    pub status: AssetStatus,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// In configured asset order.
    pub signals: Vec<Signal>,
    pub outcomes: Vec<AssetOutcome>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn skipped(&self) -> impl Iterator<Item = &AssetOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, AssetStatus::Skipped(_)))
    }
}

pub struct Scanner {
    config: ScanConfig,
    source: PriceSource,
    store: Arc<dyn SignalStore>,
    in_flight: Mutex<()>,
}

impl Scanner {
    pub fn new(config: ScanConfig, source: PriceSource, store: Arc<dyn SignalStore>) -> Self {
        Self {
            config,
            source,
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// Runs one scan. Fails only if another scan is already running on this
    /// scanner; every per-asset problem is reported inside the result.
    pub async fn run_scan(&self, cancel: &CancelToken) -> Result<ScanReport> {
        let _running = self.in_flight.try_lock().map_err(|_| AppError::ScanInProgress)?;

        info!(
            "Scanning {} assets (threshold {}%, lookback {}d, backends {:?})",
            self.config.symbols.len(),
            self.config.drop_threshold_pct,
            self.config.lookback_days,
            self.source.backend_names()
        );

        // Fetched on the first qualifying drawdown, then shared.
        let benchmark: OnceCell<Option<PriceSeries>> = OnceCell::new();

        let scans: Vec<_> = self
            .config
            .symbols
            .iter()
            .map(|asset| self.scan_asset(asset, &benchmark, cancel))
            .collect();
        let results: Vec<(AssetOutcome, Option<Signal>)> = futures::stream::iter(scans)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut report = ScanReport::default();
        for (outcome, signal) in results {
            report.cancelled |= outcome.status == AssetStatus::Cancelled;
            report.signals.extend(signal);
            report.outcomes.push(outcome);
        }

        info!(
            "Scan finished: {} signals, {} skipped{}",
            report.signals.len(),
            report.skipped().count(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    async fn scan_asset(
        &self,
        asset: &str,
        benchmark: &OnceCell<Option<PriceSeries>>,
        cancel: &CancelToken,
    ) -> (AssetOutcome, Option<Signal>) {
        let outcome = |status| AssetOutcome {
            asset: asset.to_string(),
            status,
        };

        if cancel.is_cancelled() {
            return (outcome(AssetStatus::Cancelled), None);
        }

        let series = match self.source.fetch(asset, self.config.lookback_days).await {
            SourceOutcome::Data { series, .. } => series,
            SourceOutcome::NoData { attempts } => {
                let reason = if attempts.iter().all(|a| a.outcome == AttemptOutcome::Unresolved) {
                    SkipReason::Unresolved
                } else {
                    SkipReason::NoData(
                        attempts
                            .iter()
                            .map(|a| match &a.outcome {
                                AttemptOutcome::SoftFailure(r) => format!("{}: {}", a.backend, r),
                                AttemptOutcome::Unresolved => format!("{}: unresolved", a.backend),
                                AttemptOutcome::Empty => format!("{}: empty", a.backend),
                            })
                            .collect(),
                    )
                };
                self.log_skip(asset, &reason).await;
                return (outcome(AssetStatus::Skipped(reason)), None);
            }
        };

        let Some(observation) = detect_peak_drop(&series, DRAWDOWN_WINDOW_DAYS, self.config.drop_threshold_pct)
        else {
            return (outcome(AssetStatus::Quiet), None);
        };

        let benchmark_series = benchmark
            .get_or_init(|| async {
                let fetched = self
                    .source
                    .fetch(&self.config.benchmark, self.config.lookback_days)
                    .await
                    .into_series();
                if fetched.as_ref().is_none_or(PriceSeries::is_empty) {
                    warn!("No benchmark data for {}, comparisons unavailable", self.config.benchmark);
                }
                fetched
            })
            .await;
        let benchmark_change = benchmark_series
            .as_ref()
            .and_then(|b| benchmark_change_pct(b, observation.peak_time));

        let signal = Signal {
            asset: asset.to_string(),
            kind: SignalKind::NewHighDrop,
            severity: classify(observation.drop_pct),
            drop_pct: observation.drop_pct,
            payload: SignalPayload {
                observation,
                benchmark: self.config.benchmark.clone(),
                benchmark_change_pct: benchmark_change,
            },
            generated_at: Utc::now(),
        };
        info!(
            "{}: {:.2}% below peak ({})",
            asset,
            signal.drop_pct,
            signal.severity.as_str()
        );
        (outcome(AssetStatus::Signalled), Some(signal))
    }

    async fn log_skip(&self, asset: &str, reason: &SkipReason) {
        let (level, message) = match reason {
            SkipReason::Unresolved => ("WARN", format!("Could not resolve symbol {}", asset)),
            SkipReason::NoData(reasons) => ("WARN", format!("No data for {}: {}", asset, reasons.join("; "))),
        };
        warn!("{}", message);
        if let Err(e) = self.store.insert_log(level, &message).await {
            error!("Could not record log line for {}: {}", asset, e);
        }
    }
}
