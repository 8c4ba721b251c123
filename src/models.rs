use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// --- Price Data ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Candle {
    fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Candles for one asset, ascending by time with no repeated timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    candles: Vec<Candle>,
}

impl PriceSeries {
    /// Builds a series from raw backend rows.
    ///
    /// Rows with non-finite or non-positive prices are dropped, the rest are
    /// sorted by time and only the first row seen for a timestamp is kept.
    pub fn from_candles(raw: Vec<Candle>) -> Self {
        let total = raw.len();
        let mut candles: Vec<Candle> = raw.into_iter().filter(Candle::is_valid).collect();
        // Stable sort keeps arrival order among equal timestamps, so dedup keeps the first.
        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);

        if candles.len() != total {
            debug!("Dropped {} invalid or duplicate candles", total - candles.len());
        }
        Self { candles }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

// --- Detection Output ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DrawdownObservation {
    pub peak_time: DateTime<Utc>,
    pub peak_price: f64,
    pub current_price: f64,
    pub drop_pct: f64,
    pub rsi: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    #[serde(rename = "new-high-drop")]
    NewHighDrop,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::NewHighDrop => "new-high-drop",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalPayload {
    #[serde(flatten)]
    pub observation: DrawdownObservation,
    pub benchmark: String,
    /// `None` when the benchmark had no candle at or after the peak.
    pub benchmark_change_pct: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signal {
    pub asset: String,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub severity: Severity,
    pub drop_pct: f64,
    pub payload: SignalPayload,
    pub generated_at: DateTime<Utc>,
}

/// A signal as handed back by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub id: u64,
    #[serde(flatten)]
    pub signal: Signal,
    pub stored_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub ts: DateTime<Utc>,
}
