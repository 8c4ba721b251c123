//! Ordered multi-backend retrieval of historical prices.

use crate::models::PriceSeries;
use async_trait::async_trait;
use tracing::{debug, warn};

/// What one backend made of one request.
#[derive(Debug)]
pub enum FetchOutcome {
    Series(PriceSeries),
    /// Transport, status, envelope or decoding trouble. Never fatal.
    SoftFailure(String),
    /// The backend does not know the asset.
    Unresolved,
}

#[async_trait]
pub trait PriceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, asset: &str, lookback_days: u32) -> FetchOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub backend: &'static str,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Empty,
    SoftFailure(String),
    Unresolved,
}

#[derive(Debug)]
pub enum SourceOutcome {
    /// A series from `backend`. Empty only if every backend came back empty.
    Data {
        backend: &'static str,
        series: PriceSeries,
    },
    NoData { attempts: Vec<Attempt> },
}

impl SourceOutcome {
    pub fn into_series(self) -> Option<PriceSeries> {
        match self {
            SourceOutcome::Data { series, .. } => Some(series),
            SourceOutcome::NoData { .. } => None,
        }
    }
}

/// Tries each backend in order and stops at the first non-empty series.
pub struct PriceSource {
    backends: Vec<Box<dyn PriceBackend>>,
}

impl PriceSource {
    pub fn new(backends: Vec<Box<dyn PriceBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub async fn fetch(&self, asset: &str, lookback_days: u32) -> SourceOutcome {
        let mut attempts = Vec::with_capacity(self.backends.len());
        let mut empty_from = None;

        for backend in &self.backends {
            let outcome = match backend.fetch(asset, lookback_days).await {
                FetchOutcome::Series(series) if !series.is_empty() => {
                    debug!("{}: {} candles for {}", backend.name(), series.len(), asset);
                    return SourceOutcome::Data {
                        backend: backend.name(),
                        series,
                    };
                }
                FetchOutcome::Series(_) => {
                    empty_from = Some(backend.name());
                    AttemptOutcome::Empty
                }
                FetchOutcome::SoftFailure(reason) => {
                    warn!("{} failed for {}: {}", backend.name(), asset, reason);
                    AttemptOutcome::SoftFailure(reason)
                }
                FetchOutcome::Unresolved => AttemptOutcome::Unresolved,
            };
            attempts.push(Attempt {
                backend: backend.name(),
                outcome,
            });
        }

        match empty_from {
            Some(backend) => SourceOutcome::Data {
                backend,
                series: PriceSeries::default(),
            },
            None => SourceOutcome::NoData { attempts },
        }
    }
}
