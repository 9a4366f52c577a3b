//! BIP-39 recovery phrases for stealth keys
//!
//! Derivation:
//! - scan_secret = SHA256("stealth-scanner/scan" || seed)
//! - spend_secret = SHA256("stealth-scanner/spend" || seed)
//!
//! Both are reduced mod l when the keys are built.

use anyhow::{anyhow, Result};
use bip39::Mnemonic;
use rand::RngCore;
use sha2::{Digest, Sha256};
use stealth_scanner::StealthKeys;
use zeroize::Zeroize;

const SCAN_DOMAIN: &[u8] = b"stealth-scanner/scan";
const SPEND_DOMAIN: &[u8] = b"stealth-scanner/spend";

fn derive_secret(domain: &[u8], seed: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(seed);
    hasher.finalize().into()
}

/// Rebuild keys from a recovery phrase and optional passphrase
pub fn keys_from_mnemonic(phrase: &str, passphrase: &str) -> Result<StealthKeys> {
    let mnemonic: Mnemonic = phrase
        .parse()
        .map_err(|e| anyhow!("Invalid mnemonic: {}", e))?;

    let mut seed = mnemonic.to_seed(passphrase);
    let mut scan = derive_secret(SCAN_DOMAIN, &seed);
    let mut spend = derive_secret(SPEND_DOMAIN, &seed);
    seed.zeroize();

    let keys = StealthKeys::from_secrets(&scan, &spend);
    scan.zeroize();
    spend.zeroize();
    Ok(keys)
}

/// New 24-word phrase and the keys it derives
pub fn generate_with_mnemonic() -> Result<(StealthKeys, String)> {
    let mut entropy = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| anyhow!("Failed to generate mnemonic: {}", e))?;
    entropy.zeroize();

    let phrase = mnemonic.to_string();
    let keys = keys_from_mnemonic(&phrase, "")?;
    Ok((keys, phrase))
}
