//! Encrypted key file and the key vault backed by it
//!
//! Uses AES-256-GCM for encryption and Argon2id for key derivation.
//! Keys are never stored in plaintext.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use argon2::{
    password_hash::{rand_core::RngCore, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stealth_scanner::{KeyMaterial, KeyVault, StealthKeys};
use tracing::{debug, info};
use zeroize::Zeroize;

/// Argon2 parameters for key derivation
const ARGON2_M_COST: u32 = 65536; // 64 MB memory
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

/// Password source for non-interactive runs
pub const PASSWORD_ENV: &str = "SCANNER_KEY_PASSWORD";

/// Encrypted key file format
#[derive(Serialize, Deserialize)]
pub struct EncryptedKeyFile {
    pub version: u8,
    /// Salt for Argon2
    pub salt: String,
    /// Nonce for AES-GCM (base64)
    pub nonce: String,
    /// Encrypted key data (base64)
    pub ciphertext: String,
    /// Argon2 hash used to reject a wrong password early
    pub password_hash: Option<String>,
    pub created_at: String,
}

/// Decrypted key data
#[derive(Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct KeyData {
    pub scan_secret: [u8; 32],
    pub spend_secret: [u8; 32],
    pub scan_pubkey: [u8; 32],
    pub spend_pubkey: [u8; 32],
}

impl KeyData {
    pub fn from_keys(keys: &StealthKeys) -> Self {
        let (scan_secret, spend_secret) = keys.export_secrets();
        Self {
            scan_secret,
            spend_secret,
            scan_pubkey: keys.scan_pubkey,
            spend_pubkey: keys.spend_pubkey,
        }
    }

    pub fn key_material(&self) -> KeyMaterial {
        KeyMaterial::new(self.spend_secret, self.scan_secret)
    }
}

fn argon2() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| anyhow!("Argon2 params error: {}", e))?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params))
}

impl EncryptedKeyFile {
    /// Encrypt key data with a password
    pub fn encrypt(data: &KeyData, password: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = argon2()?;

        let mut key_bytes = [0u8; 32];
        argon2
            .hash_password_into(password.as_bytes(), salt.as_str().as_bytes(), &mut key_bytes)
            .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
        let cipher =
            Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow!("Cipher creation failed: {}", e))?;
        key_bytes.zeroize();

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let mut plaintext = serde_json::to_vec(data)?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;
        plaintext.zeroize();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .ok()
            .map(|h| h.to_string());

        Ok(Self {
            version: 1,
            salt: salt.as_str().to_string(),
            nonce: b64::encode(&nonce_bytes),
            ciphertext: b64::encode(&ciphertext),
            password_hash,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Decrypt key data with a password
    pub fn decrypt(&self, password: &str) -> Result<KeyData> {
        if self.version != 1 {
            bail!("Unsupported key file version {}", self.version);
        }
        if let Some(ref hash) = self.password_hash {
            let parsed = argon2::PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|_| anyhow!("Invalid password"))?;
        }

        let mut key_bytes = [0u8; 32];
        argon2()?
            .hash_password_into(password.as_bytes(), self.salt.as_bytes(), &mut key_bytes)
            .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
        let cipher =
            Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow!("Cipher creation failed: {}", e))?;
        key_bytes.zeroize();

        let nonce_bytes = b64::decode(&self.nonce).context("Invalid nonce encoding")?;
        let ciphertext = b64::decode(&self.ciphertext).context("Invalid ciphertext encoding")?;
        let nonce_array: [u8; 12] = nonce_bytes
            .try_into()
            .map_err(|_| anyhow!("Invalid nonce length"))?;

        let mut plaintext = cipher
            .decrypt(&Nonce::from(nonce_array), ciphertext.as_ref())
            .map_err(|_| anyhow!("Decryption failed - wrong password or corrupted data"))?;
        let data = serde_json::from_slice(&plaintext).context("Failed to parse decrypted key data");
        plaintext.zeroize();
        data
    }
}

/// Encrypted key file on disk
pub struct SecureKeyStorage {
    path: PathBuf,
}

impl SecureKeyStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, data: &KeyData, password: &str) -> Result<()> {
        let encrypted = EncryptedKeyFile::encrypt(data, password)?;
        let json = serde_json::to_string_pretty(&encrypted)?;
        write_private(&self.path, json.as_bytes())
    }

    pub fn load(&self, password: &str) -> Result<KeyData> {
        let json = fs::read_to_string(&self.path).context("Failed to read encrypted key file")?;
        let encrypted: EncryptedKeyFile =
            serde_json::from_str(&json).context("Failed to parse encrypted key file")?;
        encrypted.decrypt(password)
    }

    /// Public keys only; still requires the password
    pub fn load_public(&self, password: &str) -> Result<([u8; 32], [u8; 32])> {
        let data = self.load(password)?;
        Ok((data.scan_pubkey, data.spend_pubkey))
    }
}

/// Write `bytes` with owner-only permissions, creating parent directories
pub fn write_private(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, bytes)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, bytes)?;
    }

    Ok(())
}

/// Key vault backed by the encrypted key file.
///
/// Decryption happens once in `unlock`; scan cycles read the cached
/// material until `lock` is called.
pub struct FileKeyVault {
    storage: SecureKeyStorage,
    unlocked: Mutex<Option<KeyMaterial>>,
}

impl FileKeyVault {
    pub fn new(path: PathBuf) -> Self {
        Self {
            storage: SecureKeyStorage::new(path),
            unlocked: Mutex::new(None),
        }
    }

    pub fn unlock(&self, password: &str) -> Result<()> {
        let data = self
            .storage
            .load(password)
            .context("Failed to decrypt keys. Wrong password?")?;
        *self.unlocked.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.key_material());
        info!(path = %self.storage.path().display(), "key vault unlocked");
        Ok(())
    }

    /// Unlock with `SCANNER_KEY_PASSWORD`, or prompt for the password
    pub fn unlock_interactive(&self) -> Result<()> {
        if !self.storage.exists() {
            bail!("No stealth keys found. Run 'donation-scanner keygen' first.");
        }
        let mut password = match std::env::var(PASSWORD_ENV) {
            Ok(password) => {
                debug!("using key password from {PASSWORD_ENV}");
                password
            }
            Err(_) => prompt_password("Enter password to decrypt keys: ")?,
        };
        let result = self.unlock(&password);
        password.zeroize();
        result
    }

    pub fn lock(&self) {
        *self.unlocked.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl KeyVault for FileKeyVault {
    async fn active_key_material(&self) -> Option<KeyMaterial> {
        self.unlocked.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Password strength validation
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_numeric());

    if !has_upper || !has_lower || !has_digit {
        bail!("Password must contain uppercase, lowercase, and numeric characters");
    }

    Ok(())
}

/// Prompt for password securely (hides input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Prompt for password with confirmation
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if password != confirm {
        bail!("Passwords do not match");
    }

    validate_password_strength(&password)?;

    Ok(password)
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(s: &str) -> anyhow::Result<Vec<u8>> {
        STANDARD
            .decode(s)
            .map_err(|e| anyhow::anyhow!("Base64 decode error: {}", e))
    }
}
