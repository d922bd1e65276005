use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{StateStore, StoreError};
use crate::models::Position;

/// JSON position record on local disk.
///
/// Reads the `trade_state.json` layout older versions of the bot wrote.
/// Writes go to a sibling temp file which is then renamed over the record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Position>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "State file is empty, treating as missing");
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, position: &Position) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(position)?;
        let tmp = self.temp_path();

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), in_trade = position.in_trade, "State saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
