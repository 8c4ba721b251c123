use crate::coin_gecko::FOUR_HOUR_CANDLES_MAX_DAYS;
use crate::error::{AppError, Result};
use crate::storage_utils::AsyncStorageManager;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

// CONFIGURATION STRUCTS
// Every field has a default so a partial (or missing) config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub symbols: Vec<String>,
    pub drop_threshold_pct: f64,
    /// Days of history to fetch. Clamped to [3, 90] by the free backend.
    /// Above 30 days that backend returns 4-day candles and the 3-day
    /// drawdown window can no longer produce signals.
    pub lookback_days: u32,
    pub use_cryptocompare: bool,
    pub benchmark: String,
    pub max_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: ["bitcoin", "ethereum", "solana", "ripple"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            drop_threshold_pct: 15.0,
            lookback_days: 7,
            use_cryptocompare: false,
            benchmark: "bitcoin".to_string(),
            max_concurrency: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub crypto_compare_url: String,
    pub coin_gecko_url: String,
    pub telegram_url: String,
    pub crypto_compare_timeout_secs: u64,
    pub coin_gecko_timeout_secs: u64,
    pub directory_timeout_secs: u64,
    pub telegram_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            crypto_compare_url: "https://min-api.cryptocompare.com".to_string(),
            coin_gecko_url: "https://api.coingecko.com/api/v3".to_string(),
            telegram_url: "https://api.telegram.org".to_string(),
            crypto_compare_timeout_secs: 12,
            coin_gecko_timeout_secs: 15,
            directory_timeout_secs: 12,
            telegram_timeout_secs: 15,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub http: HttpConfig,
}

/// Credentials never live in config.json.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub crypto_compare_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            crypto_compare_key: read("CRYPTOCOMPARE_KEY"),
            telegram_bot_token: read("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: read("TELEGRAM_CHAT_ID"),
        }
    }
}

impl ScanConfig {
    /// Trims symbols, drops blanks and checks numeric bounds.
    pub fn validated(mut self) -> Result<Self> {
        self.symbols = self
            .symbols
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.benchmark = self.benchmark.trim().to_string();

        if self.symbols.is_empty() {
            return Err(AppError::Config("at least one symbol is required".to_string()));
        }
        if !self.drop_threshold_pct.is_finite() || self.drop_threshold_pct <= 0.0 {
            return Err(AppError::Config(format!(
                "drop_threshold_pct must be positive, got {}",
                self.drop_threshold_pct
            )));
        }
        if self.benchmark.is_empty() {
            return Err(AppError::Config("benchmark must not be empty".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(AppError::Config("max_concurrency must be at least 1".to_string()));
        }
        if self.coarse_fallback_history() {
            warn!(
                "lookback_days = {} gives 4-day CoinGecko candles; the fallback backend will produce no signals",
                self.lookback_days
            );
        }
        Ok(self)
    }

    /// True when the free backend's candles are wider than the drawdown window.
    pub fn coarse_fallback_history(&self) -> bool {
        self.lookback_days > FOUR_HOUR_CANDLES_MAX_DAYS
    }

    /// The keyed backend is only tried with a non-empty key. The flag alone is not enough.
    pub fn primary_key<'a>(&self, secrets: &'a Secrets) -> Option<&'a str> {
        match secrets.crypto_compare_key.as_deref() {
            Some(key) => Some(key),
            None => {
                if self.use_cryptocompare {
                    warn!("use_cryptocompare is set but CRYPTOCOMPARE_KEY is empty; using CoinGecko only");
                }
                None
            }
        }
    }
}

/// Parses a comma separated symbol list as typed on the command line.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub async fn load_config(storage: &AsyncStorageManager) -> Result<AppConfig> {
    if !storage.exists("config") {
        info!("No config.json in {:?}, using defaults", storage.base_dir);
    }
    let mut config: AppConfig = storage.load_or_default("config").await?;
    config.scan = config.scan.validated()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"scan": {"symbols": ["dogecoin"], "lookback_days": 30}}"#).unwrap();
        assert_eq!(config.scan.symbols, vec!["dogecoin"]);
        assert_eq!(config.scan.lookback_days, 30);
        assert_eq!(config.scan.drop_threshold_pct, 15.0);
        assert_eq!(config.scan.benchmark, "bitcoin");
        assert_eq!(config.http.coin_gecko_timeout_secs, 15);
    }

    #[test]
    fn validation_trims_and_rejects() {
        let scan = ScanConfig {
            symbols: vec![" btc ".into(), "".into(), "eth".into()],
            ..Default::default()
        };
        assert_eq!(scan.validated().unwrap().symbols, vec!["btc", "eth"]);

        let empty = ScanConfig {
            symbols: vec!["  ".into()],
            ..Default::default()
        };
        assert!(matches!(empty.validated(), Err(AppError::Config(_))));

        let negative = ScanConfig {
            drop_threshold_pct: -1.0,
            ..Default::default()
        };
        assert!(negative.validated().is_err());

        let no_workers = ScanConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(no_workers.validated().is_err());
    }

    #[test]
    fn long_lookback_is_flagged_but_accepted() {
        let month = ScanConfig {
            lookback_days: 30,
            ..Default::default()
        };
        assert!(!month.coarse_fallback_history());

        let quarter = ScanConfig {
            lookback_days: 31,
            ..Default::default()
        };
        assert!(quarter.coarse_fallback_history());
        assert!(quarter.validated().is_ok());
    }

    #[test]
    fn primary_needs_a_key() {
        let scan = ScanConfig {
            use_cryptocompare: true,
            ..Default::default()
        };
        assert_eq!(scan.primary_key(&Secrets::default()), None);

        let secrets = Secrets {
            crypto_compare_key: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(ScanConfig::default().primary_key(&secrets), Some("abc"));
    }

    #[test]
    fn symbol_list_parsing() {
        assert_eq!(parse_symbol_list("btc, eth,,sol "), vec!["btc", "eth", "sol"]);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        let config = load_config(&storage).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
