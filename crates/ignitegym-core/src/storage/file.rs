use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::{KeyValueStore, StorageError};

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes land in a temporary file that is renamed over the target, so a
/// concurrent or later reader sees either the old value or the new one.
pub struct FileStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(key: &str) -> String {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", sanitized)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.key_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.key_path(key);
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", Self::file_name(key), n));

        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key = key, "Stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => {
                debug!(key = key, "Removed value");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> FileStore {
        let dir = std::env::temp_dir().join(format!(
            "ignitegym-filestore-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        FileStore::new(dir)
    }

    #[test]
    fn test_file_name_sanitizes_key() {
        assert_eq!(FileStore::file_name("ignitegym.token"), "ignitegym.token.json");
        assert_eq!(FileStore::file_name("@app:user/1"), "_app_user_1.json");
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let store = temp_store("missing");
        assert!(store.get("nothing").await.expect("read should succeed").is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_remove_is_idempotent() {
        let store = temp_store("overwrite");

        store.set("k", "one").await.expect("first write");
        store.set("k", "two").await.expect("second write");
        assert_eq!(store.get("k").await.expect("read").as_deref(), Some("two"));

        store.remove("k").await.expect("remove");
        store.remove("k").await.expect("second remove is not an error");
        assert!(store.get("k").await.expect("read").is_none());

        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .expect("dir exists")
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty(), "no temporary files left behind");

        let _ = std::fs::remove_dir_all(store.dir());
    }
}
