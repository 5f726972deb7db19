//! OS-keychain storage for the session-file encryption key.
//!
//! The persisted session holds live bearer tokens, so it is encrypted at
//! rest. The key never touches disk: it lives in the platform keychain
//! and is generated on first use.

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use rand::RngCore;

/// Keychain service name for FinSol secrets.
const SERVICE_NAME: &str = "finsol";

/// Keychain account under which the session-file key is stored.
const KEY_ACCOUNT: &str = "session-key";

/// Key length for ChaCha20-Poly1305.
pub const KEY_LEN: usize = 32;

pub struct KeyVault;

impl KeyVault {
    /// Fetch the session-file key, generating and storing a fresh one on
    /// first use.
    pub fn load_or_create_key() -> Result<[u8; KEY_LEN]> {
        let entry =
            Entry::new(SERVICE_NAME, KEY_ACCOUNT).context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(encoded) => decode_key(&encoded),
            Err(keyring::Error::NoEntry) => {
                let key = generate_key();
                entry
                    .set_password(&encode_key(&key))
                    .context("Failed to store session key in keychain")?;
                Ok(key)
            }
            Err(err) => Err(err).context("Failed to read session key from keychain"),
        }
    }

    /// Remove the stored key. Safe to call when no key exists.
    pub fn delete_key() -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, KEY_ACCOUNT).context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err).context("Failed to delete session key from keychain"),
        }
    }
}

fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn encode_key(key: &[u8; KEY_LEN]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    if encoded.len() != KEY_LEN * 2 || !encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("Stored session key has an invalid format"));
    }

    let mut key = [0u8; KEY_LEN];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&encoded[i * 2..i * 2 + 2], 16)
            .context("Stored session key has an invalid format")?;
    }
    Ok(key)
}
