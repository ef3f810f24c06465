#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use certiwipe_contracts::provider_secrets::ProviderSecretId;
use certiwipe_contracts::UnixTimeMs;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const VAULT_FORMAT: u8 = 1;
const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("unknown secret id: {0}")]
    UnknownSecretId(String),
    #[error("secret value must not be blank")]
    BlankSecret,
    #[error("vault io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("vault file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("vault entry is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("vault file format {0} is not supported")]
    UnsupportedFormat(u8),
    #[error("vault entry could not be sealed or opened")]
    Crypto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    format: u8,
    secrets: BTreeMap<String, SealedSecret>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            format: VAULT_FORMAT,
            secrets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedSecret {
    nonce: String,
    ciphertext: String,
    updated_at: UnixTimeMs,
}

/// Local AES-256-GCM sealed store for provider credentials.
///
/// Only ids known to [`ProviderSecretId`] are accepted. The master key lives
/// next to the vault file (`*.master.key`) and is created on first write.
#[derive(Debug, Clone)]
pub struct DeviceVault {
    vault_path: PathBuf,
    key_path: PathBuf,
}

impl DeviceVault {
    pub fn default_local() -> Self {
        let vault_path = env::var("CERTIWIPE_DEVICE_VAULT_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_vault_path);
        let mut key_path = vault_path.clone();
        key_path.set_extension("master.key");
        Self::for_paths(vault_path, key_path)
    }

    pub fn for_paths(vault_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            vault_path,
            key_path,
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn set_secret(&self, secret_id: &str, value: &str) -> Result<(), VaultError> {
        let id = parse_secret_id(secret_id)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(VaultError::BlankSecret);
        }

        let cipher = self.cipher(true)?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
            .map_err(|_| VaultError::Crypto)?;

        let mut file = self.load()?.unwrap_or_default();
        file.secrets.insert(
            id.as_str().to_string(),
            SealedSecret {
                nonce: BASE64.encode(nonce),
                ciphertext: BASE64.encode(ciphertext),
                updated_at: now_unix_ms(),
            },
        );
        self.store(&file)
    }

    pub fn resolve_secret(&self, secret_id: &str) -> Result<Option<String>, VaultError> {
        let id = parse_secret_id(secret_id)?;
        let Some(file) = self.load()? else {
            return Ok(None);
        };
        let Some(sealed) = file.secrets.get(id.as_str()) else {
            return Ok(None);
        };

        let nonce = BASE64.decode(sealed.nonce.as_bytes())?;
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Crypto);
        }
        let ciphertext = BASE64.decode(sealed.ciphertext.as_bytes())?;
        let plaintext = self
            .cipher(false)?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| VaultError::Crypto)?;
        let secret = String::from_utf8(plaintext).map_err(|_| VaultError::Crypto)?;
        Ok(Some(secret).filter(|s| !s.trim().is_empty()))
    }

    pub fn has_secret(&self, secret_id: &str) -> Result<bool, VaultError> {
        Ok(self.resolve_secret(secret_id)?.is_some())
    }

    pub fn delete_secret(&self, secret_id: &str) -> Result<bool, VaultError> {
        let id = parse_secret_id(secret_id)?;
        let Some(mut file) = self.load()? else {
            return Ok(false);
        };
        if file.secrets.remove(id.as_str()).is_none() {
            return Ok(false);
        }
        self.store(&file)?;
        Ok(true)
    }

    /// Stored ids, sorted. Entries with unknown ids are skipped.
    pub fn list_secret_ids(&self) -> Result<Vec<String>, VaultError> {
        let Some(file) = self.load()? else {
            return Ok(Vec::new());
        };
        Ok(file
            .secrets
            .keys()
            .filter(|k| ProviderSecretId::parse(k).is_some())
            .cloned()
            .collect())
    }

    fn load(&self) -> Result<Option<VaultFile>, VaultError> {
        if !self.vault_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.vault_path)?;
        if raw.trim().is_empty() {
            return Ok(Some(VaultFile::default()));
        }
        let file: VaultFile = serde_json::from_str(&raw)?;
        if file.format != VAULT_FORMAT {
            return Err(VaultError::UnsupportedFormat(file.format));
        }
        Ok(Some(file))
    }

    fn store(&self, file: &VaultFile) -> Result<(), VaultError> {
        create_parent(&self.vault_path)?;
        let bytes = serde_json::to_vec_pretty(file)?;
        let mut tmp = self.vault_path.clone();
        tmp.set_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(tmp, &self.vault_path)?;
        Ok(())
    }

    /// A missing master key is only created when `create` is set; reads
    /// against a vault without a key fail closed.
    fn cipher(&self, create: bool) -> Result<Aes256Gcm, VaultError> {
        let key = if self.key_path.exists() {
            let decoded = BASE64.decode(fs::read_to_string(&self.key_path)?.trim().as_bytes())?;
            if decoded.len() != MASTER_KEY_LEN {
                return Err(VaultError::Crypto);
            }
            decoded
        } else if create {
            let mut key = vec![0u8; MASTER_KEY_LEN];
            OsRng.fill_bytes(&mut key);
            create_parent(&self.key_path)?;
            write_restricted(&self.key_path, BASE64.encode(&key).as_bytes())?;
            key
        } else {
            return Err(VaultError::Crypto);
        };
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Crypto)
    }
}

fn parse_secret_id(raw: &str) -> Result<ProviderSecretId, VaultError> {
    ProviderSecretId::parse(raw).ok_or_else(|| VaultError::UnknownSecretId(raw.to_string()))
}

fn default_vault_path() -> PathBuf {
    let config_root = env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")));
    match config_root {
        Some(root) => root.join("certiwipe").join("device_vault.json"),
        None => PathBuf::from(".certiwipe").join("device_vault.json"),
    }
}

fn now_unix_ms() -> UnixTimeMs {
    UnixTimeMs::now()
}

fn create_parent(path: &Path) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_restricted(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(data)?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
