//! File-backed store.
//!
//! Layout under the root directory:
//!
//! ```text
//! keys/<hex(sha256(user_id))>.json       wrapped key record
//! rotation/<hex(sha256(user_id))>.json   rotation sequence state
//! ```
//!
//! Writes go to a temp file that is fsynced and renamed over the target, so
//! a crash or a cancelled task leaves either the old record or the new one,
//! never a half-written ciphertext. The directory is fsynced after the
//! rename. A replaced record stays reachable through a `.old` hard link
//! until the rename lands and is then shredded. Deletes overwrite the file
//! with zeros and fsync before unlinking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::store::{EncryptedKeyRecord, RotationState, Store, StoreError};

const KEYS_DIR: &str = "keys";
const ROTATION_DIR: &str = "rotation";
const SHRED_CHUNK: usize = 4096;

/// Store that keeps one JSON file per user under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/pmid/identities`.
    pub fn default_root() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "pmid", "pmid")
            .map(|dirs| dirs.data_dir().join("identities"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, user_id: &str) -> PathBuf {
        self.root.join(KEYS_DIR).join(file_name(user_id))
    }

    fn rotation_path(&self, user_id: &str) -> PathBuf {
        self.root.join(ROTATION_DIR).join(file_name(user_id))
    }
}

/// User ids never reach the filesystem directly.
fn file_name(user_id: &str) -> String {
    format!("{}.json", hex::encode(Sha256::digest(user_id.as_bytes())))
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).await?;

    // Restrict before any secret-bearing bytes are written
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    // A leftover link may still share the live record's inode: unlink only.
    let previous = path.with_extension("old");
    match fs::remove_file(&previous).await {
        Ok(()) => debug!(path = %previous.display(), "removed stale replaced record"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let replacing = match fs::hard_link(path, &previous).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    fs::rename(&temp_path, path).await?;
    sync_parent(path).await?;

    if replacing {
        shred(&previous).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    write_atomic(path, &json).await
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::DataCorruption(format!("{}: {e}", path.display())))
}

/// Overwrite with zeros, fsync, unlink. Returns false if the file was absent.
async fn shred(path: &Path) -> Result<bool, StoreError> {
    let mut file = match fs::OpenOptions::new().write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let zeros = [0u8; SHRED_CHUNK];
    let mut remaining = file.metadata().await?.len();
    while remaining > 0 {
        let n = remaining.min(SHRED_CHUNK as u64) as usize;
        file.write_all(&zeros[..n]).await?;
        remaining -= n as u64;
    }
    file.sync_all().await?;
    drop(file);

    fs::remove_file(path).await?;
    sync_parent(path).await?;
    Ok(true)
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, record: EncryptedKeyRecord) -> Result<(), StoreError> {
        let path = self.key_path(&record.user_id);
        write_json(&path, &record).await?;
        debug!(path = %path.display(), "stored key record");
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedKeyRecord>, StoreError> {
        let record: Option<EncryptedKeyRecord> = read_json(&self.key_path(user_id)).await?;
        match record {
            Some(r) if r.user_id != user_id => Err(StoreError::DataCorruption(format!(
                "record for {user_id} names a different user"
            ))),
            other => Ok(other),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        if shred(&self.key_path(user_id)).await? {
            debug!(user_id, "shredded key record");
        }
        Ok(())
    }

    async fn deactivate(&self, user_id: &str) -> Result<bool, StoreError> {
        let Some(mut record) = self.get(user_id).await? else {
            return Ok(false);
        };
        record.is_active = false;
        write_json(&self.key_path(user_id), &record).await?;
        Ok(true)
    }

    async fn purge_inactive(&self) -> Result<usize, StoreError> {
        let dir = self.root.join(KEYS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<EncryptedKeyRecord>(&path).await {
                Ok(Some(record)) if !record.is_active => {
                    if shred(&path).await? {
                        purged += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(purged)
    }

    async fn put_rotation_state(&self, state: RotationState) -> Result<(), StoreError> {
        write_json(&self.rotation_path(&state.user_id), &state).await
    }

    async fn get_rotation_state(&self, user_id: &str) -> Result<Option<RotationState>, StoreError> {
        read_json(&self.rotation_path(user_id)).await
    }
}
