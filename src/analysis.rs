//! This module contains the scan pipeline: scan, persist, notify.

use crate::error::Result;
use crate::notifier::{Notifier, format_signal_message};
use crate::scanner::{CancelToken, ScanReport, Scanner};
use crate::store::SignalStore;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub stored: usize,
    pub notified: usize,
    pub notify_failures: usize,
}

/// Runs the full scan pipeline:
/// 1. Scans every configured asset.
/// 2. Stores each signal the scan produced.
/// 3. Sends each signal to the notifier, if one is given and configured.
///
/// Store and notifier failures are logged and counted; they never discard
/// signals the scan produced.
pub async fn run_scan_pipeline(
    scanner: &Scanner,
    store: &dyn SignalStore,
    notifier: Option<&dyn Notifier>,
    cancel: &CancelToken,
) -> Result<(ScanReport, PipelineSummary)> {
    // Step 1: Scan
    let report = scanner.run_scan(cancel).await?;
    let mut summary = PipelineSummary::default();

    // Step 2: Persist
    for signal in &report.signals {
        match store.insert_signal(signal).await {
            Ok(id) => {
                summary.stored += 1;
                info!("Stored signal #{} for {}", id, signal.asset);
            }
            Err(e) => error!("Could not store signal for {}: {}", signal.asset, e),
        }
    }

    // Step 3: Notify
    let notifier = match notifier {
        Some(n) if n.is_configured() => Some(n),
        Some(_) => {
            warn!("Notifications requested but Telegram credentials are missing");
            None
        }
        None => None,
    };

    if let Some(notifier) = notifier {
        for signal in &report.signals {
            match notifier.send_message(&format_signal_message(signal)).await {
                Ok(()) => summary.notified += 1,
                Err(e) => {
                    summary.notify_failures += 1;
                    let message = format!("Notification for {} failed: {}", signal.asset, e);
                    error!("{}", message);
                    if let Err(log_err) = store.insert_log("ERROR", &message).await {
                        error!("Could not record log line: {}", log_err);
                    }
                }
            }
        }
    }

    Ok((report, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::error::AppError;
    use crate::price_source::PriceSource;
    use crate::scanner::tests::{RecordingStore, fallback};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        fn is_configured(&self) -> bool {
            true
        }

        async fn send_message(&self, _text: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Notify("network unreachable".to_string()))
        }
    }

    fn scanner(store: Arc<RecordingStore>) -> Scanner {
        let config = ScanConfig {
            symbols: vec!["solana".into(), "cardano".into(), "ripple".into()],
            ..Default::default()
        };
        Scanner::new(config, PriceSource::new(vec![Box::new(fallback())]), store)
    }

    #[tokio::test]
    async fn signals_are_stored_even_when_notifications_fail() {
        let store = Arc::new(RecordingStore::default());
        let scanner = scanner(Arc::clone(&store));
        let notifier = FailingNotifier {
            attempts: AtomicUsize::new(0),
        };

        let (report, summary) = run_scan_pipeline(&scanner, store.as_ref(), Some(&notifier), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.signals.len(), 2);
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.notified, 0);
        assert_eq!(summary.notify_failures, 2);
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.signals.lock().unwrap().len(), 2);

        let logs = store.logs.lock().unwrap();
        let errors = logs.iter().filter(|l| l.level == "ERROR").count();
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn stored_signals_come_back_unchanged() {
        let store = Arc::new(RecordingStore::default());
        let scanner = scanner(Arc::clone(&store));

        let (report, _) = run_scan_pipeline(&scanner, store.as_ref(), None, &CancelToken::new())
            .await
            .unwrap();

        let fetched = store.fetch_signals(10).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].signal, report.signals[1]);
        assert_eq!(fetched[1].signal, report.signals[0]);
    }
}
