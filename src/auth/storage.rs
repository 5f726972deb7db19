//! Durable session persistence.
//!
//! Tokens, the user profile, and the expiry estimate survive a restart so
//! the app can resume without a fresh login. The on-disk form is encrypted
//! with a keychain-held key; a stored session whose expiry has passed is
//! rejected at load time by the hydration path.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::vault::{KeyVault, KEY_LEN};
use crate::models::UserProfile;

/// Session file name in the data directory.
const SESSION_FILE: &str = "session.bin";

/// Directory name under the platform data dir.
const APP_DIR: &str = "finsol";

/// ChaCha20-Poly1305 nonce length; the nonce is prepended to the
/// ciphertext in the session file.
const NONCE_LEN: usize = 12;

/// The subset of session state that survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Durable key-value home for the session. The store writes through this
/// on login and refresh and purges it on logout.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Option<PersistedSession>>,
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        *self.inner.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap() = None;
        Ok(())
    }
}

/// Encrypted on-disk storage under the platform data directory.
pub struct DiskStorage {
    path: PathBuf,
    cipher: ChaCha20Poly1305,
}

impl DiskStorage {
    /// Open storage at the default location, creating the encryption key
    /// in the OS keychain on first use.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not find data directory"))?
            .join(APP_DIR);
        Self::open(dir, KeyVault::load_or_create_key()?)
    }

    /// Open storage in `dir` with an explicit key.
    pub fn open(dir: PathBuf, key: [u8; KEY_LEN]) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(Self {
            path: dir.join(SESSION_FILE),
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }
}

impl SessionStorage for DiskStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&self.path).context("Failed to read session file")?;
        if bytes.len() < NONCE_LEN {
            return Err(anyhow!("Session file is truncated"));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt session file"))?;

        let session: PersistedSession =
            serde_json::from_slice(&plaintext).context("Failed to parse session file")?;

        debug!("loaded persisted session");
        Ok(Some(session))
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        let plaintext = serde_json::to_vec(session)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| anyhow!("Failed to encrypt session file"))?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);

        std::fs::write(&self.path, bytes).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_session() -> PersistedSession {
        PersistedSession {
            access_token: "at-1".to_string(),
            refresh_token: "rt-1".to_string(),
            user: UserProfile {
                id: "u-1".to_string(),
                email: Some("marie@example.ht".to_string()),
                phone: None,
                first_name: Some("Marie".to_string()),
                last_name: None,
                region: None,
                default_currency: Some("HTG".to_string()),
            },
            expires_at: Utc::now() + Duration::minutes(15),
            last_activity: Some(Utc::now()),
            session_id: Some("s-1".to_string()),
            device_id: None,
        }
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::default();
        assert!(storage.load().unwrap().is_none());

        let session = sample_session();
        storage.save(&session).unwrap();
        assert_eq!(storage.load().unwrap(), Some(session));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_disk_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path().to_path_buf(), [7u8; KEY_LEN]).unwrap();

        let session = sample_session();
        storage.save(&session).unwrap();

        assert_eq!(storage.load().unwrap(), Some(session));
    }

    #[test]
    fn test_disk_storage_is_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path().to_path_buf(), [7u8; KEY_LEN]).unwrap();
        storage.save(&sample_session()).unwrap();

        let raw = std::fs::read(dir.path().join(SESSION_FILE)).unwrap();
        let raw_text = String::from_utf8_lossy(&raw);

        assert!(!raw_text.contains("at-1"), "token must not appear in plaintext");
        assert!(!raw_text.contains("rt-1"));
    }

    #[test]
    fn test_disk_storage_rejects_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path().to_path_buf(), [7u8; KEY_LEN]).unwrap();
        storage.save(&sample_session()).unwrap();

        let other = DiskStorage::open(dir.path().to_path_buf(), [8u8; KEY_LEN]).unwrap();

        assert!(other.load().is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::open(dir.path().to_path_buf(), [7u8; KEY_LEN]).unwrap();

        storage.clear().unwrap();
        storage.save(&sample_session()).unwrap();
        storage.clear().unwrap();
        storage.clear().unwrap();

        assert!(storage.load().unwrap().is_none());
    }
}
