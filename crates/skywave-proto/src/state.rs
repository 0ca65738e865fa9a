use crate::protocol::DaemonState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState {
    pub volume: f32,
}

/// Shared, published snapshot of daemon state.  The daemon core is the only
/// writer; socket clients read it.
pub struct StateManager {
    state: Arc<RwLock<DaemonState>>,
    state_file: PathBuf,
}

impl StateManager {
    pub fn new(state_file: PathBuf, default_volume: f32) -> Self {
        let persistent =
            Self::load_persistent(&state_file).unwrap_or(PersistentState {
                volume: default_volume,
            });

        let state = DaemonState {
            rev: 1,
            volume: persistent.volume.clamp(0.0, 1.0),
            ..DaemonState::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            state_file,
        }
    }

    pub async fn get_state(&self) -> DaemonState {
        self.state.read().await.clone()
    }

    pub async fn volume(&self) -> f32 {
        self.state.read().await.volume
    }

    /// Apply `f` and bump the revision.
    pub async fn update<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut DaemonState),
    {
        let mut state = self.state.write().await;
        f(&mut state);
        state.rev += 1;
        state.rev
    }

    pub async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.volume = volume.clamp(0.0, 1.0);
            state.rev += 1;
        }
        self.save().await
    }

    async fn save(&self) -> anyhow::Result<()> {
        let persistent = PersistentState {
            volume: self.state.read().await.volume,
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &PathBuf) -> Option<PersistentState> {
        let content = std::fs::read_to_string(state_file).ok()?;
        serde_json::from_str::<PersistentState>(&content).ok()
    }
}
