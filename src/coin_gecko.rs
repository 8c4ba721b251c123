use crate::error::FetchError;
use crate::models::{Candle, PriceSeries};
use crate::price_source::{FetchOutcome, PriceBackend};
use crate::symbol_resolver::SymbolResolver;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

pub const MIN_LOOKBACK_DAYS: u32 = 3;
pub const MAX_LOOKBACK_DAYS: u32 = 90;
/// Beyond this many days the OHLC endpoint answers with 4-day candles
/// (4-hour candles from 3 to 30 days).
pub const FOUR_HOUR_CANDLES_MAX_DAYS: u32 = 30;

/// `[timestamp_ms, open, high, low, close]`
type OhlcRow = (f64, f64, f64, f64, f64);

/// Free OHLC backend (`/coins/{id}/ohlc`). Assets are resolved through the
/// coin directory first; candles carry no volume.
pub struct CoinGeckoBackend {
    client: Client,
    base_url: String,
    resolver: Arc<SymbolResolver>,
}

impl CoinGeckoBackend {
    pub fn new(client: Client, base_url: &str, resolver: Arc<SymbolResolver>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            resolver,
        }
    }

    async fn fetch_ohlc(&self, coin_id: &str, days: u32) -> Result<Vec<Candle>, FetchError> {
        let url = format!("{}/coins/{}/ohlc", self.base_url, coin_id);
        let params = [("vs_currency", "usd".to_string()), ("days", days.to_string())];

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let rows: Vec<OhlcRow> = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        rows.into_iter()
            .map(|(ts_ms, open, high, low, close)| {
                let time = DateTime::from_timestamp_millis(ts_ms as i64)
                    .ok_or_else(|| FetchError::Decode(format!("bad timestamp {}", ts_ms)))?;
                Ok(Candle {
                    time,
                    open,
                    high,
                    low,
                    close,
                    volume: None,
                })
            })
            .collect()
    }
}

pub fn clamp_lookback(days: u32) -> u32 {
    days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS)
}

#[async_trait]
impl PriceBackend for CoinGeckoBackend {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch(&self, asset: &str, lookback_days: u32) -> FetchOutcome {
        let Some(coin_id) = self.resolver.resolve(asset).await else {
            warn!("Could not map '{}' to a CoinGecko id", asset);
            return FetchOutcome::Unresolved;
        };

        let days = clamp_lookback(lookback_days);
        match self.fetch_ohlc(&coin_id, days).await {
            Ok(candles) => {
                debug!("coingecko returned {} rows for {} over {} days", candles.len(), coin_id, days);
                FetchOutcome::Series(PriceSeries::from_candles(candles))
            }
            Err(e) => FetchOutcome::SoftFailure(format!("{} ({})", e, coin_id)),
        }
    }
}
