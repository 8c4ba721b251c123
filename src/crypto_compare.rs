use crate::error::FetchError;
use crate::models::{Candle, PriceSeries};
use crate::price_source::{FetchOutcome, PriceBackend};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const QUOTE_CURRENCY: &str = "USD";
pub const MAX_HOURLY_CANDLES: u32 = 500;

#[derive(Deserialize, Debug)]
struct HistoEnvelope {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Option<HistoData>,
}

#[derive(Deserialize, Debug)]
struct HistoData {
    #[serde(rename = "Data", default)]
    data: Vec<HistoRow>,
}

#[derive(Deserialize, Debug)]
struct HistoRow {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volumefrom: Option<f64>,
}

/// Keyed hourly backend (`/data/v2/histohour`).
pub struct CryptoCompareBackend {
    client: Client,
    base_url: String,
    api_key: String,
    limit: u32,
}

impl CryptoCompareBackend {
    pub fn new(client: Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            limit: MAX_HOURLY_CANDLES,
        }
    }

    async fn fetch_hourly(&self, asset: &str) -> Result<Vec<Candle>, FetchError> {
        let url = format!("{}/data/v2/histohour", self.base_url);
        let params = [
            ("fsym", asset.to_uppercase()),
            ("tsym", QUOTE_CURRENCY.to_string()),
            ("limit", self.limit.to_string()),
            ("api_key", self.api_key.clone()),
        ];

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let envelope: HistoEnvelope = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        if envelope.response != "Success" {
            return Err(FetchError::Envelope(envelope.message));
        }

        let rows = envelope.data.map(|d| d.data).unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let time = DateTime::from_timestamp(row.time, 0)
                    .ok_or_else(|| FetchError::Decode(format!("bad timestamp {}", row.time)))?;
                Ok(Candle {
                    time,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    volume: row.volumefrom,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PriceBackend for CryptoCompareBackend {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    async fn fetch(&self, asset: &str, _lookback_days: u32) -> FetchOutcome {
        match self.fetch_hourly(asset).await {
            Ok(candles) => {
                debug!("cryptocompare returned {} rows for {}", candles.len(), asset);
                FetchOutcome::Series(PriceSeries::from_candles(candles))
            }
            Err(e) => FetchOutcome::SoftFailure(e.to_string()),
        }
    }
}
