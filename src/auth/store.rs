use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use base64::Engine as _;
use log::warn;
use serde::{Deserialize, Serialize};

use super::secrets::{CipherError, SecretCipher};

const STORE_FILE: &str = "user-secrets.json";

#[derive(Debug)]
pub enum StoreError {
    Encryption(CipherError),
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Encryption(e) => write!(f, "{e}"),
            StoreError::Io(e) => write!(f, "failed to write credential file: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// On-disk layout. `key` is base64 of the cipher output, never the raw key.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    email: String,
    key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SavedCredential {
    pub email: String,
    pub key: String,
}

/// Durable storage for the single credential record of this installation.
///
/// Knows nothing about the network; any record it cannot read back is
/// treated as absent so startup falls back to the logged-out state instead
/// of crashing.
pub struct CredentialStore {
    path: PathBuf,
    cipher: Box<dyn SecretCipher>,
}

impl CredentialStore {
    pub fn new(data_dir: PathBuf, cipher: Box<dyn SecretCipher>) -> Self {
        Self {
            path: data_dir.join(STORE_FILE),
            cipher,
        }
    }

    /// Encrypt and persist, replacing any prior record. Nothing is written
    /// if encryption is unavailable.
    pub fn save(&self, email: &str, raw_key: &str) -> Result<(), StoreError> {
        let sealed = self.cipher.encrypt(raw_key).map_err(StoreError::Encryption)?;
        let record = StoredRecord {
            email: email.to_string(),
            key: base64::engine::general_purpose::STANDARD.encode(sealed),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(StoreError::Io)?;
        }
        // Write-then-rename so a crash mid write never leaves a truncated
        // record behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(StoreError::Io)?;
        fs::rename(&tmp, &self.path).map_err(StoreError::Io)?;
        Ok(())
    }

    /// Read back the saved credential. Any failure (missing file, bad JSON,
    /// bad base64, undecryptable blob) means "no usable credential".
    pub fn load(&self) -> Option<SavedCredential> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("could not read credential file: {e}");
                return None;
            }
        };
        let record: StoredRecord = match serde_json::from_str(&data) {
            Ok(record) => record,
            Err(e) => {
                warn!("credential file is not valid JSON, ignoring: {e}");
                return None;
            }
        };
        let sealed = match base64::engine::general_purpose::STANDARD.decode(&record.key) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!("credential blob is not valid base64, ignoring: {e}");
                return None;
            }
        };
        match self.cipher.decrypt(&sealed) {
            Ok(key) => Some(SavedCredential {
                email: record.email,
                key,
            }),
            Err(e) => {
                warn!("saved credential could not be decrypted, ignoring: {e}");
                None
            }
        }
    }

    /// Delete the record. Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    #[cfg(test)]
    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }
}
