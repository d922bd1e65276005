use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use tokio::time::{timeout, Duration};

use super::{StateStore, StoreError};
use crate::models::Position;

/// Position record kept as a JSON string in Redis
///
/// Key: `bandbot:position:{symbol}`
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisStateStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `symbol` - Traded symbol, namespaces the key
    pub async fn new(redis_url: &str, symbol: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: format!("bandbot:position:{}", symbol),
        })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self) -> Result<Option<Position>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&self.key).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, position: &Position) -> Result<(), StoreError> {
        let json = serde_json::to_string(position)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, json).await?;

        tracing::debug!(key = %self.key, in_trade = position.in_trade, "State saved to Redis");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("redis key {}", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        // Try to connect to non-existent Redis
        let result = RedisStateStore::new("redis://192.0.2.1:6379", "BTCUSDT").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load_position() {
        let store = RedisStateStore::new("redis://127.0.0.1:6379", "TEST_BANDBOT")
            .await
            .expect("Failed to connect to Redis");

        let position = Position {
            in_trade: true,
            entry_price: 64000.5,
            stop_loss_order_id: Some(2),
            target_order_id: Some(3),
            ..Position::flat()
        };
        store.save(&position).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(position));

        // Cleanup
        store.save(&Position::flat()).await.unwrap();
        assert!(!store.load().await.unwrap().unwrap().in_trade);
    }
}
