//! Sink state persistence
//!
//! A [`SinkState`] is read once before a replay and written once after the replay
//! committed. Stores:
//! - FileSinkStateStore: one JSON document per key on the local file system
//! - MemorySinkStateStore: in-process map, for tests and short-lived runs

mod error;
#[cfg(feature = "native-fs")]
mod filesystem;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{SinkState, SinkStateKey};

pub use error::{StateError, StateResult};
#[cfg(feature = "native-fs")]
pub use filesystem::FileSinkStateStore;

/// Trait for sink state stores
#[async_trait]
pub trait SinkStateStore: Send + Sync {
    /// Load the state for a key; `None` when nothing was written yet
    async fn load(&self, key: &SinkStateKey) -> StateResult<Option<SinkState>>;

    /// Replace the state for a key
    async fn save(&self, key: &SinkStateKey, state: &SinkState) -> StateResult<()>;
}

/// In-memory sink state store
#[derive(Debug, Default)]
pub struct MemorySinkStateStore {
    states: RwLock<HashMap<SinkStateKey, SinkState>>,
}

impl MemorySinkStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SinkStateStore for MemorySinkStateStore {
    async fn load(&self, key: &SinkStateKey) -> StateResult<Option<SinkState>> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn save(&self, key: &SinkStateKey, state: &SinkState) -> StateResult<()> {
        self.states.write().await.insert(key.clone(), state.clone());
        Ok(())
    }
}
