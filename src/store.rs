//! Persistence for generated signals and the scan log.

use crate::error::{AppError, Result};
use crate::models::{LogRecord, Signal, SignalRecord};
use crate::storage_utils::AsyncStorageManager;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

pub const MAX_LOG_ENTRIES: usize = 5000;

const SIGNALS_DOC: &str = "signals";
const LOGS_DOC: &str = "logs";
/// Highest id ever issued. Survives `clear_signals`, so ids are never reused.
const SIGNALS_SEQ_DOC: &str = "signals_seq";

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn insert_signal(&self, signal: &Signal) -> Result<u64>;

    /// Newest first.
    async fn fetch_signals(&self, limit: usize) -> Result<Vec<SignalRecord>>;

    async fn insert_log(&self, level: &str, message: &str) -> Result<()>;

    async fn clear_signals(&self) -> Result<()>;
}

/// Keeps `signals.json` and `logs.json` in the storage directory.
pub struct JsonFileStore {
    storage: AsyncStorageManager,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(storage: AsyncStorageManager) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    async fn load_signals(&self) -> Result<Vec<SignalRecord>> {
        self.storage
            .load_or_default(SIGNALS_DOC)
            .await
            .map_err(|e| AppError::Store(format!("reading signals: {}", e)))
    }

    pub async fn fetch_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let logs: Vec<LogRecord> = self.storage.load_or_default(LOGS_DOC).await?;
        Ok(logs.into_iter().rev().take(limit).collect())
    }
}

#[async_trait]
impl SignalStore for JsonFileStore {
    async fn insert_signal(&self, signal: &Signal) -> Result<u64> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_signals().await?;
        let issued: u64 = self.storage.load_or_default(SIGNALS_SEQ_DOC).await?;
        let id = records.iter().map(|r| r.id).fold(issued, u64::max) + 1;
        records.push(SignalRecord {
            id,
            signal: signal.clone(),
            stored_at: Utc::now(),
        });

        self.storage
            .save(SIGNALS_DOC, &records)
            .await
            .map_err(|e| AppError::Store(format!("writing signals: {}", e)))?;
        self.storage
            .save(SIGNALS_SEQ_DOC, &id)
            .await
            .map_err(|e| AppError::Store(format!("writing signal sequence: {}", e)))?;
        Ok(id)
    }

    async fn fetch_signals(&self, limit: usize) -> Result<Vec<SignalRecord>> {
        let mut records = self.load_signals().await?;
        records.sort_by(|a, b| b.id.cmp(&a.id));
        records.truncate(limit);
        Ok(records)
    }

    async fn insert_log(&self, level: &str, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut logs: Vec<LogRecord> = self.storage.load_or_default(LOGS_DOC).await?;
        logs.push(LogRecord {
            level: level.to_string(),
            message: message.to_string(),
            ts: Utc::now(),
        });
        if logs.len() > MAX_LOG_ENTRIES {
            logs.drain(..logs.len() - MAX_LOG_ENTRIES);
        }

        self.storage
            .save(LOGS_DOC, &logs)
            .await
            .map_err(|e| AppError::Store(format!("writing logs: {}", e)))
    }

    async fn clear_signals(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage
            .save(SIGNALS_DOC, &Vec::<SignalRecord>::new())
            .await
            .map_err(|e| AppError::Store(format!("clearing signals: {}", e)))
    }
}
