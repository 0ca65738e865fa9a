use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::history::{load_json, save_json};
use crate::protocol::Station;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteEntry {
    pub station: Station,
    pub added_at: DateTime<Local>,
}

/// Starred stations, newest first.
pub struct FavoritesStore {
    entries: Vec<FavoriteEntry>,
    file: Option<PathBuf>,
}

impl FavoritesStore {
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            file: None,
        }
    }

    pub fn open(file: PathBuf) -> Self {
        Self {
            entries: load_json(&file).unwrap_or_default(),
            file: Some(file),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.station.id == id)
    }

    /// No-op if the station is already a favorite.
    pub fn add(&mut self, station: Station) {
        if self.contains(&station.id) {
            return;
        }
        self.entries.insert(
            0,
            FavoriteEntry {
                station,
                added_at: Local::now(),
            },
        );
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.retain(|e| e.station.id != id);
    }

    /// Returns whether the station is a favorite afterwards.
    pub fn toggle(&mut self, station: Station) -> bool {
        if self.contains(&station.id) {
            self.remove(&station.id);
            false
        } else {
            self.add(station);
            true
        }
    }

    pub fn entries(&self) -> Vec<FavoriteEntry> {
        self.entries.clone()
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        match &self.file {
            Some(file) => save_json(file, &self.entries).await,
            None => Ok(()),
        }
    }
}
