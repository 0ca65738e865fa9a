use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::Station;

/// Number of recently played stations kept.
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub station: Station,
    pub played_at: DateTime<Local>,
}

/// Recently played stations, newest first, unique by station id.
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    file: Option<PathBuf>,
}

impl HistoryStore {
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
            capacity: HISTORY_CAPACITY,
            file: None,
        }
    }

    /// Load from `file`.  A missing or unreadable file starts empty.
    pub fn open(file: PathBuf) -> Self {
        let mut entries: VecDeque<HistoryEntry> = load_json(&file).unwrap_or_default();
        entries.truncate(HISTORY_CAPACITY);
        Self {
            entries,
            capacity: HISTORY_CAPACITY,
            file: Some(file),
        }
    }

    /// Move `station` to the front, evicting the oldest entry past capacity.
    pub fn record(&mut self, station: Station) {
        self.entries.retain(|e| e.station.id != station.id);
        self.entries.push_front(HistoryEntry {
            station,
            played_at: Local::now(),
        });
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        match &self.file {
            Some(file) => save_json(file, &self.entries).await,
            None => Ok(()),
        }
    }
}

pub(crate) fn load_json<T: serde::de::DeserializeOwned>(file: &Path) -> Option<T> {
    let content = std::fs::read_to_string(file).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("ignoring unreadable {:?}: {}", file, e);
            None
        }
    }
}

pub(crate) async fn save_json<T: Serialize>(file: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(file, json).await?;
    Ok(())
}
