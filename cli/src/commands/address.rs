//! Display the stealth meta-address

use anyhow::{bail, Context, Result};
use colored::Colorize;
use stealth_scanner::crypto::encode_meta_address;

use crate::config::CliConfig;
use crate::secure_storage::{prompt_password, SecureKeyStorage};

pub fn run(config: &CliConfig) -> Result<()> {
    let storage = SecureKeyStorage::new(config.key_file()?);
    if !storage.exists() {
        bail!("No stealth keys found. Run 'donation-scanner keygen' first.");
    }

    let password = prompt_password("Enter password to decrypt keys: ")?;
    let (scan_pubkey, spend_pubkey) = storage
        .load_public(&password)
        .context("Failed to decrypt keys. Wrong password?")?;

    println!();
    println!("{}", "Your Stealth Meta-Address".yellow().bold());
    println!();
    println!("{}", encode_meta_address(&spend_pubkey, &scan_pubkey));
    println!();
    println!("{}:", "Components".dimmed());
    println!("  Spend pubkey: {}", hex::encode(spend_pubkey));
    println!("  Scan pubkey:  {}", hex::encode(scan_pubkey));
    println!();
    println!("{}", "Share the meta-address above to receive donations.".dimmed());

    Ok(())
}
