use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::CoreError;
use crate::models::cache::{FxRateEntry, StoredPayload, StoredQuote};

use super::format;

/// Every table of the market store, as persisted to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub quotes: HashMap<String, StoredQuote>,
    pub raw: HashMap<String, StoredPayload>,
    pub fx: HashMap<String, FxRateEntry>,
    /// `{provider}:{YYYY-MM-DD}` → calls made that day
    pub usage: HashMap<String, u32>,
}

impl StoreSnapshot {
    pub fn total_entries(&self) -> usize {
        self.quotes.len() + self.raw.len() + self.fx.len()
    }
}

/// Save/load store snapshots to/from bytes or files.
pub struct StorageManager;

impl StorageManager {
    /// Flow: StoreSnapshot → bincode → QSTR envelope bytes
    pub fn save_to_bytes(snapshot: &StoreSnapshot) -> Result<Vec<u8>, CoreError> {
        let payload = bincode::serialize(snapshot)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize store: {e}")))?;
        Ok(format::write_file(format::CURRENT_VERSION, &payload))
    }

    /// Flow: QSTR bytes → parse header → bincode → StoreSnapshot
    pub fn load_from_bytes(data: &[u8]) -> Result<StoreSnapshot, CoreError> {
        let (_header, payload) = format::read_file(data)?;
        bincode::deserialize(payload)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize store: {e}")))
    }

    /// Write the snapshot atomically: a sibling temp file is written and
    /// renamed over the target, so readers never see a partial file.
    pub async fn save_to_file(snapshot: &StoreSnapshot, path: &Path) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(snapshot)?;
        let tmp = path.with_extension("qstr.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load a snapshot from disk. A missing file is an empty store.
    pub fn load_from_file(path: &Path) -> Result<StoreSnapshot, CoreError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::load_from_bytes(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }
}
