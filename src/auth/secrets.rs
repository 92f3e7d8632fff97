use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};

const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum CipherError {
    /// The platform cannot protect secrets at all. Login must not proceed.
    Unavailable(String),
    /// The cipher itself failed to seal the plaintext. Distinct from
    /// `Unavailable`: the platform store was reachable.
    Encrypt(String),
    /// Ciphertext could not be recovered (wrong key, corruption, migration).
    Decrypt(String),
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherError::Unavailable(msg) => {
                write!(f, "secret protection unavailable on this platform: {msg}")
            }
            CipherError::Encrypt(msg) => write!(f, "failed to encrypt secret: {msg}"),
            CipherError::Decrypt(msg) => write!(f, "failed to decrypt secret: {msg}"),
        }
    }
}

impl std::error::Error for CipherError {}

/// Capability for protecting one string at rest.
///
/// Production binds to the OS credential store; tests use a reversible
/// in-memory stub so they never touch the host keychain.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, CipherError>;
}

/// OS-backed cipher: a random 256-bit master key lives in the platform
/// secure store (Windows Credential Manager, macOS Keychain, Secret
/// Service), and the credential itself is sealed with AES-256-GCM, nonce
/// prepended. Only the ciphertext ever reaches disk.
pub struct KeyringCipher {
    service: String,
}

impl KeyringCipher {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CipherError> {
        keyring::Entry::new(&self.service, "master-key")
            .map_err(|e| CipherError::Unavailable(e.to_string()))
    }

    /// Fetch the master key, creating it on first use.
    fn master_key(&self) -> Result<[u8; 32], CipherError> {
        let entry = self.entry()?;
        match entry.get_secret() {
            Ok(bytes) => bytes
                .try_into()
                .map_err(|_| CipherError::Unavailable("stored master key has wrong size".into())),
            Err(keyring::Error::NoEntry) => {
                let key = Aes256Gcm::generate_key(&mut OsRng);
                entry
                    .set_secret(key.as_slice())
                    .map_err(|e| CipherError::Unavailable(e.to_string()))?;
                Ok(key.into())
            }
            Err(e) => Err(CipherError::Unavailable(e.to_string())),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, CipherError> {
        let key = self.master_key()?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
    }
}

impl SecretCipher for KeyringCipher {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CipherError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;
        Ok([nonce.as_slice(), &sealed].concat())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, CipherError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::Decrypt("ciphertext too short".into()));
        }
        let cipher = self.cipher()?;
        let nonce = Nonce::from_slice(&ciphertext[..NONCE_LEN]);
        let plain = cipher
            .decrypt(nonce, &ciphertext[NONCE_LEN..])
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;
        String::from_utf8(plain).map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

/// Construct the production cipher.
///
/// Callers should depend on the `SecretCipher` trait, not the concrete type,
/// so tests can substitute a stub and future platforms can swap backends.
pub fn default_cipher() -> Box<dyn SecretCipher> {
    Box::new(KeyringCipher::new("EdgeDesk"))
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Reversible stub: XORs with a fixed pad byte. Not secure, just
    /// round-trippable without the host keychain.
    pub struct MemoryCipher;

    impl SecretCipher for MemoryCipher {
        fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CipherError> {
            Ok(plaintext.bytes().map(|b| b ^ 0x5a).collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<String, CipherError> {
            let plain: Vec<u8> = ciphertext.iter().map(|b| b ^ 0x5a).collect();
            String::from_utf8(plain).map_err(|e| CipherError::Decrypt(e.to_string()))
        }
    }

    /// Cipher that always refuses, for exercising the encryption-unavailable
    /// path.
    pub struct UnavailableCipher;

    impl SecretCipher for UnavailableCipher {
        fn encrypt(&self, _plaintext: &str) -> Result<Vec<u8>, CipherError> {
            Err(CipherError::Unavailable("no secure store".into()))
        }

        fn decrypt(&self, _ciphertext: &[u8]) -> Result<String, CipherError> {
            Err(CipherError::Unavailable("no secure store".into()))
        }
    }

    /// Cipher whose seal operation fails even though the platform store is
    /// reachable.
    pub struct SealFailureCipher;

    impl SecretCipher for SealFailureCipher {
        fn encrypt(&self, _plaintext: &str) -> Result<Vec<u8>, CipherError> {
            Err(CipherError::Encrypt("seal failed".into()))
        }

        fn decrypt(&self, _ciphertext: &[u8]) -> Result<String, CipherError> {
            Err(CipherError::Decrypt("nothing sealed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryCipher;
    use super::*;

    #[test]
    fn memory_cipher_round_trips() {
        let cipher = MemoryCipher;
        let sealed = cipher.encrypt("api-key-123").unwrap();
        assert_ne!(sealed, b"api-key-123");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "api-key-123");
    }
}
