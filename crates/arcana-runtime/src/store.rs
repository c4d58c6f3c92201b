//! Persistence traits and in-memory implementations.
//!
//! Persistence is an external collaborator; the pipeline consumes it
//! through these traits and fails open when it misbehaves — a querent
//! still receives their accepted reading even if storing it failed.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use arcana_core::Reading;

/// Errors from persistence collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Reading persistence.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn get_reading(&self, id: Uuid) -> Result<Option<Reading>, StoreError>;

    async fn put_reading(&self, reading: &Reading) -> Result<(), StoreError>;
}

/// In-memory reading store for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    readings: RwLock<HashMap<Uuid, Reading>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    /// Snapshot of everything stored, for tests and local inspection.
    pub fn all(&self) -> Vec<Reading> {
        self.readings.read().values().cloned().collect()
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn get_reading(&self, id: Uuid) -> Result<Option<Reading>, StoreError> {
        Ok(self.readings.read().get(&id).cloned())
    }

    async fn put_reading(&self, reading: &Reading) -> Result<(), StoreError> {
        self.readings.write().insert(reading.id, reading.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcana_core::ReadingState;
    use chrono::Utc;

    fn reading() -> Reading {
        Reading {
            id: Uuid::new_v4(),
            state: ReadingState::Accepted,
            spread_key: "single".into(),
            drawn_cards: vec![],
            question: "q".into(),
            narrative_text: "## A\nx\n## B\ny".into(),
            accepted_backend_id: Some("local-composer".into()),
            structural_gate_result: None,
            evaluation_gate_result: None,
            prompt_version: Some("reading-contract/3".into()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_reading() {
        let store = MemoryReadingStore::new();
        let r = reading();
        store.put_reading(&r).await.unwrap();

        let loaded = store.get_reading(r.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, r.id);
        assert_eq!(loaded.narrative_text, r.narrative_text);
    }

    #[tokio::test]
    async fn missing_reading_is_none() {
        let store = MemoryReadingStore::new();
        assert!(store.get_reading(Uuid::new_v4()).await.unwrap().is_none());
    }
}
