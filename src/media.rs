//! Media store for submitted photos.
//!
//! Photos are kept on disk under one directory per conversation:
//! `<root>/<conversation slug>/user_photo.jpg`. A new submission overwrites
//! the previous one for the same conversation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::conversation::ConversationKey;
use crate::error::MediaError;

/// File name used for every stored photo.
pub const PHOTO_FILE_NAME: &str = "user_photo.jpg";

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist a photo for `key`, returning where it was written.
    async fn save_photo(&self, key: &ConversationKey, bytes: &[u8]) -> Result<PathBuf, MediaError>;
}

/// File-backed media store.
pub struct LocalMediaStore {
    base_path: PathBuf,
}

impl LocalMediaStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where the photo for `key` lives.
    pub fn photo_path(&self, key: &ConversationKey) -> PathBuf {
        self.base_path.join(key.storage_slug()).join(PHOTO_FILE_NAME)
    }

    /// Ensure the root directory exists.
    pub async fn ensure_dirs(&self) -> Result<(), MediaError> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save_photo(&self, key: &ConversationKey, bytes: &[u8]) -> Result<PathBuf, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::EmptyFile {
                conversation: key.to_string(),
            });
        }

        let path = self.photo_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target, then rename over it.
        let tmp = path.with_extension("jpg.part");
        if let Err(e) = write_then_rename(&tmp, &path, bytes).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), "Failed to remove partial photo: {cleanup}");
                }
            }
            return Err(e.into());
        }

        tracing::debug!(conversation = %key, path = %path.display(), size = bytes.len(), "Photo stored");
        Ok(path)
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, bytes).await?;
    fs::rename(tmp, path).await
}
