use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Per-process chat state. Lost on restart.
#[derive(Debug, Default)]
pub struct BotState {
    muted: RwLock<BTreeSet<String>>,
}

impl BotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the source was already muted.
    pub async fn mute(&self, source_id: &str) -> bool {
        self.muted.write().await.insert(source_id.to_string())
    }

    /// Returns false if the source was not muted.
    pub async fn unmute(&self, source_id: &str) -> bool {
        self.muted.write().await.remove(source_id)
    }

    pub async fn is_muted(&self, source_id: &str) -> bool {
        self.muted.read().await.contains(source_id)
    }

    pub async fn muted(&self) -> Vec<String> {
        self.muted.read().await.iter().cloned().collect()
    }
}
