use crate::analysis::run_scan_pipeline;
use crate::coin_gecko::CoinGeckoBackend;
use crate::config::{AppConfig, HttpConfig, Secrets, load_config, parse_symbol_list};
use crate::crypto_compare::CryptoCompareBackend;
use crate::error::Result;
use crate::notifier::{Notifier, TelegramNotifier};
use crate::price_source::{PriceBackend, PriceSource};
use crate::scanner::{CancelToken, Scanner};
use crate::storage_utils::AsyncStorageManager;
use crate::store::{JsonFileStore, SignalStore};
use crate::symbol_resolver::SymbolResolver;
use crate::table;
use clap::{Parser, Subcommand};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "drawdown-screener")]
#[command(about = "Flags assets that fell sharply from a recent peak", long_about = None)]
pub struct Cli {
    /// Directory holding config.json, signals.json and logs.json
    /// (default: `storage/` next to the binary)
    #[arg(long, global = true, env = "SCREENER_STORAGE")]
    pub storage: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scan and store the signals
    Scan {
        /// Comma separated symbols, overriding config.json
        #[arg(short, long)]
        symbols: Option<String>,
        /// Drop threshold in percent, overriding config.json
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Send each signal to Telegram
        #[arg(long)]
        notify: bool,
        /// Re-download the coin directory before scanning
        #[arg(long)]
        refresh_directory: bool,
    },
    /// Scan periodically until Ctrl-C
    Watch {
        #[arg(long, default_value_t = 60)]
        every_mins: u64,
        #[arg(long)]
        notify: bool,
    },
    /// Show stored signals, newest first
    Signals {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
    /// Show the most recent scan log lines
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Delete stored signals
    Clear,
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(8)
        .build()?)
}

fn build_resolver(http: &HttpConfig) -> Result<Arc<SymbolResolver>> {
    Ok(Arc::new(SymbolResolver::new(
        http_client(http.directory_timeout_secs)?,
        &http.coin_gecko_url,
    )))
}

/// Keyed hourly backend first (only with a key), free backend second.
fn build_source(config: &AppConfig, secrets: &Secrets, resolver: Arc<SymbolResolver>) -> Result<PriceSource> {
    let http: &HttpConfig = &config.http;
    let mut backends: Vec<Box<dyn PriceBackend>> = Vec::new();

    if let Some(key) = config.scan.primary_key(secrets) {
        backends.push(Box::new(CryptoCompareBackend::new(
            http_client(http.crypto_compare_timeout_secs)?,
            &http.crypto_compare_url,
            key.to_string(),
        )));
    }

    backends.push(Box::new(CoinGeckoBackend::new(
        http_client(http.coin_gecko_timeout_secs)?,
        &http.coin_gecko_url,
        resolver,
    )));

    Ok(PriceSource::new(backends))
}

fn build_notifier(config: &AppConfig, secrets: &Secrets) -> Result<TelegramNotifier> {
    Ok(TelegramNotifier::new(
        http_client(config.http.telegram_timeout_secs)?,
        &config.http.telegram_url,
        secrets.telegram_bot_token.clone(),
        secrets.telegram_chat_id.clone(),
    ))
}

async fn open_storage(dir: Option<PathBuf>) -> Result<AsyncStorageManager> {
    match dir {
        Some(dir) => AsyncStorageManager::new(dir).await,
        None => AsyncStorageManager::new_relative("storage").await,
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let storage = open_storage(cli.storage).await?;
    let store = Arc::new(JsonFileStore::new(storage.clone()));

    match cli.command {
        Commands::Scan {
            symbols,
            threshold,
            notify,
            refresh_directory,
        } => {
            let mut config = load_config(&storage).await?;
            if let Some(raw) = symbols {
                config.scan.symbols = parse_symbol_list(&raw);
            }
            if let Some(t) = threshold {
                config.scan.drop_threshold_pct = t;
            }
            config.scan = config.scan.validated()?;

            let secrets = Secrets::from_env();
            let resolver = build_resolver(&config.http)?;
            if refresh_directory {
                let snapshot = resolver.refresh().await;
                info!("Coin directory refreshed: {} entries", snapshot.entries.len());
            }
            let source = build_source(&config, &secrets, resolver)?;
            let scanner = Scanner::new(config.scan.clone(), source, store.clone());
            let notifier = if notify { Some(build_notifier(&config, &secrets)?) } else { None };

            let (report, summary) = run_scan_pipeline(
                &scanner,
                store.as_ref(),
                notifier.as_ref().map(|n| n as &dyn Notifier),
                &CancelToken::new(),
            )
            .await?;

            println!("{}", table::render_report(&report));
            println!(
                "Stored {} signals, sent {} notifications ({} failed).",
                summary.stored, summary.notified, summary.notify_failures
            );
        }
        Commands::Watch { every_mins, notify } => {
            let config = load_config(&storage).await?;
            let secrets = Secrets::from_env();
            let scanner = Arc::new(Scanner::new(
                config.scan.clone(),
                build_source(&config, &secrets, build_resolver(&config.http)?)?,
                store.clone(),
            ));
            let notifier: Option<Arc<dyn Notifier>> = if notify {
                Some(Arc::new(build_notifier(&config, &secrets)?))
            } else {
                None
            };
            watch(scanner, store, notifier, every_mins.max(1)).await;
        }
        Commands::Signals { limit } => {
            let records = store.fetch_signals(limit).await?;
            println!("{}", table::render_records(&records));
        }
        Commands::Logs { limit } => {
            for line in store.fetch_logs(limit).await?.iter().rev() {
                println!("{} [{}] {}", line.ts.format("%Y-%m-%d %H:%M:%S"), line.level, line.message);
            }
        }
        Commands::Clear => {
            store.clear_signals().await?;
            println!("Cleared stored signals in {:?}", storage.base_dir);
        }
    }

    Ok(())
}

/// Each scan runs in its own task so Ctrl-C is noticed while it is in flight.
async fn watch(
    scanner: Arc<Scanner>,
    store: Arc<JsonFileStore>,
    notifier: Option<Arc<dyn Notifier>>,
    every_mins: u64,
) {
    let cancel = CancelToken::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(every_mins * 60));
    info!("Watching every {} minutes, Ctrl-C to stop", every_mins);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        let mut task = {
            let (scanner, store, notifier, cancel) =
                (scanner.clone(), store.clone(), notifier.clone(), cancel.clone());
            tokio::spawn(async move {
                run_scan_pipeline(&scanner, store.as_ref(), notifier.as_deref(), &cancel).await
            })
        };

        let outcome = tokio::select! {
            joined = &mut task => joined,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping after the current asset");
                cancel.cancel();
                if let Ok(Ok((report, _))) = task.await {
                    println!("{}", table::render_report(&report));
                }
                break;
            }
        };

        match outcome {
            Ok(Ok((report, _))) => println!("{}", table::render_report(&report)),
            Ok(Err(e)) => error!("Scan failed: {}", e),
            Err(e) => error!("Scan task panicked: {}", e),
        }
    }
    info!("Watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_accepts_directory_refresh_flag() {
        let cli = Cli::try_parse_from(["drawdown-screener", "scan", "--refresh-directory", "-s", "btc,eth"]).unwrap();
        match cli.command {
            Commands::Scan {
                refresh_directory,
                symbols,
                ..
            } => {
                assert!(refresh_directory);
                assert_eq!(symbols.as_deref(), Some("btc,eth"));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn directory_refresh_is_off_by_default() {
        let cli = Cli::try_parse_from(["drawdown-screener", "scan"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { refresh_directory: false, .. }));
    }
}
