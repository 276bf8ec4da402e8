// src/storage.rs
use crate::core::registry::RegistrySnapshot;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// JSON snapshot of the alert registry on local disk.
#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no snapshot has been written yet.
    pub async fn load(&self) -> Result<Option<RegistrySnapshot>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let snapshot: RegistrySnapshot = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        info!(
            "Restored {} alerts from {}",
            snapshot.alerts.len(),
            self.path.display()
        );
        Ok(Some(snapshot))
    }

    /// Writes to a sibling temp file first so a crash never leaves a torn snapshot.
    pub async fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::AlertRegistry;
    use crate::types::{AlertSpec, Direction, Quote};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alerts.json"));

        let mut registry = AlertRegistry::new();
        let alert = registry
            .create(
                AlertSpec::new("BTCUSDT", dec!(45000), Direction::Above),
                Some(dec!(44000)),
                Utc::now(),
            )
            .unwrap();
        registry.evaluate(&Quote::new("BTCUSDT", dec!(45200), 1), Utc::now());
        store.save(&registry.snapshot()).await.unwrap();

        let restored = AlertRegistry::restore(store.load().await.unwrap().unwrap());
        let back = restored.get(alert.id).unwrap();
        assert!(back.is_terminal());
        assert!(!back.is_active);
        assert_eq!(back.trigger_count, 1);
        assert_eq!(back.target_price, dec!(45000));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(AlertStore::new(path).load().await.is_err());
    }
}
