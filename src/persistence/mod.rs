// Durable storage for the single position record
pub mod file;
pub mod redis;

pub use file::JsonFileStore;
pub use self::redis::RedisStateStore;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::Position;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state record is malformed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("{0}")]
    Timeout(String),

    #[error("state store lock poisoned")]
    Poisoned,
}

/// Single-record position store.
///
/// `save` overwrites the whole record; readers never see a partial write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when nothing has been stored yet
    async fn load(&self) -> Result<Option<Position>, StoreError>;

    async fn save(&self, position: &Position) -> Result<(), StoreError>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Load the stored record, creating a FLAT one on first run
pub async fn load_or_init(store: &dyn StateStore) -> Result<Position, StoreError> {
    match store.load().await? {
        Some(position) => {
            tracing::info!(
                in_trade = position.in_trade,
                store = %store.describe(),
                "Loaded position state"
            );
            Ok(position)
        }
        None => {
            let position = Position::flat();
            store.save(&position).await?;
            tracing::info!(store = %store.describe(), "No stored position, initialized FLAT record");
            Ok(position)
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<Position>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(position: Position) -> Self {
        Self {
            record: Mutex::new(Some(position)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<Position> {
        self.record.lock().map(|r| r.clone()).unwrap_or(None)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<Position>, StoreError> {
        let record = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(record.clone())
    }

    async fn save(&self, position: &Position) -> Result<(), StoreError> {
        let mut record = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        *record = Some(position.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
