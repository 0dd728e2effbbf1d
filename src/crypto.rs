//! Symmetric encryption for secrets kept in the cluster store.
//!
//! Values are sealed with AES-256-GCM under a key kept next to the store and
//! written back as `ENC:<base64(nonce || ciphertext)>`. Anything without the
//! prefix is treated as plaintext, so stores written before encryption was
//! enabled keep loading.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use base64::Engine;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::SshConfig;

pub const ENCRYPTED_PREFIX: &str = "ENC:";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

pub struct CryptoManager {
    key: [u8; KEY_SIZE],
    key_file: Option<PathBuf>,
}

impl CryptoManager {
    /// Loads the key from `key_file`, generating and persisting a fresh one when the file is missing.
    pub fn open(key_file: impl AsRef<Path>) -> Result<Self> {
        let path = key_file.as_ref();
        let key = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read key file {}", path.display()))?;
            decode_hex_key(raw.trim())
                .with_context(|| format!("invalid key in {}", path.display()))?
        } else {
            let key = generate_key();
            write_key_file(path, &key)?;
            info!(path = %path.display(), "generated new encryption key file");
            key
        };

        Ok(Self {
            key,
            key_file: Some(path.to_path_buf()),
        })
    }

    #[cfg(test)]
    pub fn from_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key,
            key_file: None,
        }
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|error| anyhow::anyhow!("failed to create cipher: {error}"))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|error| anyhow::anyhow!("encryption failed: {error}"))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + sealed.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&sealed);
        Ok(format!(
            "{ENCRYPTED_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(payload)
        ))
    }

    /// Decrypts an `ENC:` value. Plaintext passes through; an undecryptable value is
    /// returned unchanged so a wrong key never wipes the stored secret.
    pub fn decrypt(&self, value: &str) -> String {
        let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
            return value.to_string();
        };

        match self.open_sealed(encoded) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                warn!("failed to decrypt stored value: {error:#}");
                value.to_string()
            }
        }
    }

    pub fn encrypt_ssh_config(&self, config: &SshConfig) -> Result<SshConfig> {
        let mut sealed = config.clone();
        if let Some(password) = config.password.as_deref()
            && !password.is_empty()
            && !is_encrypted(password)
        {
            sealed.password = Some(self.encrypt(password)?);
        }
        Ok(sealed)
    }

    pub fn decrypt_ssh_config(&self, config: &SshConfig) -> SshConfig {
        let mut opened = config.clone();
        if let Some(password) = config.password.as_deref()
            && !password.is_empty()
        {
            opened.password = Some(self.decrypt(password));
        }
        opened
    }

    fn open_sealed(&self, encoded: &str) -> Result<String> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("base64 decode failed")?;
        if payload.len() < NONCE_SIZE + TAG_SIZE {
            anyhow::bail!("ciphertext too short");
        }

        let (nonce, sealed) = payload.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|error| anyhow::anyhow!("failed to create cipher: {error}"))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|error| anyhow::anyhow!("decryption failed: {error}"))?;
        String::from_utf8(plaintext).context("decrypted value is not UTF-8")
    }
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill(&mut key);
    key
}

fn decode_hex_key(raw: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = hex::decode(raw).context("key is not valid hex")?;
    if bytes.len() != KEY_SIZE {
        anyhow::bail!("key must be {KEY_SIZE} bytes (got {})", bytes.len());
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn write_key_file(path: &Path, key: &[u8; KEY_SIZE]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, hex::encode(key))
        .with_context(|| format!("failed to write key file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CryptoManager, ENCRYPTED_PREFIX, generate_key, is_encrypted};
    use crate::model::SshConfig;

    fn ssh_config(password: Option<&str>) -> SshConfig {
        SshConfig {
            hostname: "10.1.2.3".to_string(),
            username: "ops".to_string(),
            password: password.map(str::to_string),
            key_path: None,
            port: 22,
        }
    }

    #[test]
    fn encrypted_values_carry_prefix_and_open_again() {
        let crypto = CryptoManager::from_key(generate_key());
        let sealed = crypto.encrypt("hunter2").unwrap();

        assert!(sealed.starts_with(ENCRYPTED_PREFIX));
        assert_ne!(sealed, crypto.encrypt("hunter2").unwrap());
        assert_eq!(crypto.decrypt(&sealed), "hunter2");
    }

    #[test]
    fn plaintext_and_empty_values_pass_through() {
        let crypto = CryptoManager::from_key(generate_key());
        assert_eq!(crypto.decrypt("plain"), "plain");
        assert_eq!(crypto.encrypt("").unwrap(), "");
    }

    #[test]
    fn wrong_key_leaves_value_untouched() {
        let sealed = CryptoManager::from_key(generate_key())
            .encrypt("secret")
            .unwrap();
        let other = CryptoManager::from_key(generate_key());
        assert_eq!(other.decrypt(&sealed), sealed);
        assert_eq!(other.decrypt("ENC:not-base64!!"), "ENC:not-base64!!");
    }

    #[test]
    fn ssh_config_encryption_only_touches_password() {
        let crypto = CryptoManager::from_key(generate_key());
        let sealed = crypto.encrypt_ssh_config(&ssh_config(Some("pw"))).unwrap();

        assert_eq!(sealed.hostname, "10.1.2.3");
        assert!(is_encrypted(sealed.password.as_deref().unwrap()));

        let again = crypto.encrypt_ssh_config(&sealed).unwrap();
        assert_eq!(again.password, sealed.password);

        let opened = crypto.decrypt_ssh_config(&sealed);
        assert_eq!(opened.password.as_deref(), Some("pw"));

        let no_password = crypto.encrypt_ssh_config(&ssh_config(None)).unwrap();
        assert_eq!(no_password.password, None);
    }

    #[test]
    fn key_file_is_generated_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/.crypto.key");

        let first = CryptoManager::open(&path).unwrap();
        assert!(path.exists());
        let sealed = first.encrypt("value").unwrap();

        let second = CryptoManager::open(&path).unwrap();
        assert_eq!(second.decrypt(&sealed), "value");
        assert_eq!(second.key_file(), Some(path.as_path()));
    }

    #[test]
    fn corrupt_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".crypto.key");
        std::fs::write(&path, "deadbeef").unwrap();
        assert!(CryptoManager::open(&path).is_err());
    }
}
