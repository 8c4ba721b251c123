use crate::error::{AppError, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// STORAGE MANAGER

/// JSON documents in one directory, one file per document name.
#[derive(Debug, Clone)]
pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Uses `dir` as is, creating it if needed.
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let base_dir = dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// **Constructor: new_relative**
    /// Resolves `relative_path` against the directory of the running binary,
    /// so `cargo run` and an installed binary each get their own storage.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;
        // 2. Append the relative path (e.g. "storage") to its directory
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| AppError::Io("Could not find binary directory".to_string()))?
            .join(relative_path);

        // 3. Create the directory up front so saves never have to check
        Self::new(base_dir).await
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// **Generic Save Function**
    /// Serializes any `Serialize` value to `<name>.json` with an atomic write:
    /// a crash mid-write leaves the previous file intact.
    pub async fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let final_path = self.path_for(name);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", name));

        // Pretty output keeps signals.json readable by hand.
        let json_bytes = serde_json::to_vec_pretty(data)?;

        // 1. Write data to the temporary file
        fs::write(&tmp_path, json_bytes).await?;
        // 2. Rename it over the final name
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    /// **Generic Load Function**
    /// Reads `<name>.json` and deserializes it into `T`.
    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        // serde_json validates UTF-8 itself, no need for read_to_string.
        let content = fs::read(self.path_for(name)).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Like [`load`](Self::load) but a missing file yields `T::default()`.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        if !self.exists(name) {
            return Ok(T::default());
        }
        self.load(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn save_then_load_and_missing_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path().join("nested")).await.unwrap();

        let missing: Vec<u32> = storage.load_or_default("nothing").await.unwrap();
        assert!(missing.is_empty());

        let mut doc = BTreeMap::new();
        doc.insert("threshold".to_string(), 15.5);
        storage.save("doc", &doc).await.unwrap();

        assert!(storage.exists("doc"));
        assert!(!dir.path().join("nested").join("doc.json.tmp").exists());
        let back: BTreeMap<String, f64> = storage.load("doc").await.unwrap();
        assert_eq!(back, doc);
    }
}
