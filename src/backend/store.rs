//! Recordings directory with JSON sidecars
//!
//! A saved recording is the capture file moved to `<dir>/<id>.<ext>` plus
//! `<dir>/<id>.json` holding its descriptor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::capability::{RecordingDescriptor, RecordingId, RecordingStore, StoreError};

pub struct JsonRecordingStore {
    dir: PathBuf,
}

impl JsonRecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn metadata_path(&self, id: RecordingId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Read back the descriptor of a saved recording
    pub async fn load(&self, id: RecordingId) -> Result<RecordingDescriptor, StoreError> {
        let bytes = fs::read(self.metadata_path(id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Rename, falling back to copy and delete across filesystems
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    debug!(from = %from.display(), to = %to.display(), "rename failed, copying");
    fs::copy(from, to).await?;
    fs::remove_file(from).await
}

#[async_trait]
impl RecordingStore for JsonRecordingStore {
    async fn save(
        &self,
        descriptor: &RecordingDescriptor,
        source: &Path,
    ) -> Result<RecordingId, StoreError> {
        if !fs::try_exists(source).await? {
            return Err(StoreError::MissingSource(source.to_path_buf()));
        }

        fs::create_dir_all(&self.dir).await?;

        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("wav");
        let destination = self.dir.join(format!("{}.{extension}", descriptor.id));
        move_file(source, &destination).await?;

        let stored = RecordingDescriptor {
            source_path: destination,
            ..descriptor.clone()
        };
        let metadata = serde_json::to_vec_pretty(&stored)?;
        fs::write(self.metadata_path(descriptor.id), metadata).await?;

        info!(
            recording = %descriptor.id,
            path = %stored.source_path.display(),
            "recording stored"
        );
        Ok(descriptor.id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::capability::TriggerKind;

    #[tokio::test]
    async fn test_save_moves_file_and_writes_sidecar() {
        let scratch = tempfile::tempdir().unwrap();
        let recordings = tempfile::tempdir().unwrap();
        let source = scratch.path().join("capture-1.wav");
        std::fs::write(&source, b"RIFF....WAVE").unwrap();

        let store = JsonRecordingStore::new(recordings.path());
        let descriptor =
            RecordingDescriptor::new(source.clone(), Duration::from_secs(12), TriggerKind::Keyword);
        let id = assert_ok!(store.save(&descriptor, &source).await);

        assert_eq!(id, descriptor.id);
        assert!(!source.exists());
        let moved = recordings.path().join(format!("{id}.wav"));
        assert_eq!(std::fs::read(&moved).unwrap(), b"RIFF....WAVE");

        let stored = assert_ok!(store.load(id).await);
        assert_eq!(stored.source_path, moved);
        assert_eq!(stored.duration, Duration::from_secs(12));
        assert_eq!(stored.trigger, TriggerKind::Keyword);
    }

    #[tokio::test]
    async fn test_save_without_source() {
        let recordings = tempfile::tempdir().unwrap();
        let store = JsonRecordingStore::new(recordings.path());
        let source = recordings.path().join("gone.wav");
        let descriptor = RecordingDescriptor::new(source.clone(), Duration::ZERO, TriggerKind::Manual);

        let err = assert_err!(store.save(&descriptor, &source).await);
        assert_eq!(err, StoreError::MissingSource(source));
        assert!(!store.metadata_path(descriptor.id).exists());
    }
}
