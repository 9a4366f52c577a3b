//! Key generation with encrypted storage and mnemonic support

use anyhow::{bail, Result};
use colored::Colorize;
use stealth_scanner::StealthKeys;

use crate::config::CliConfig;
use crate::mnemonic::{generate_with_mnemonic, keys_from_mnemonic};
use crate::secure_storage::{prompt_new_password, KeyData, SecureKeyStorage};

pub struct KeygenOptions {
    /// Force overwrite existing keys
    pub force: bool,
    /// Generate a recovery phrase alongside the keys
    pub with_mnemonic: bool,
    pub import_mnemonic: Option<String>,
    /// Optional BIP-39 passphrase
    pub passphrase: Option<String>,
}

pub fn run(config: &CliConfig, options: KeygenOptions) -> Result<()> {
    let path = config.key_file()?;
    let storage = SecureKeyStorage::new(path.clone());

    if storage.exists() && !options.force {
        bail!(
            "Stealth keys already exist. Use --force to overwrite.\n\
             Warning: donations sent to the old meta-address will no longer be detected!"
        );
    }

    println!("{}", "=== Donation Scanner Key Generation ===".cyan().bold());
    println!();

    let (keys, mnemonic) = if let Some(ref phrase) = options.import_mnemonic {
        println!("{}", "Importing keys from mnemonic phrase...".cyan());
        let passphrase = options.passphrase.as_deref().unwrap_or("");
        (keys_from_mnemonic(phrase, passphrase)?, None)
    } else if options.with_mnemonic {
        println!("{}", "Generating keys with recovery phrase...".cyan());
        let (keys, phrase) = generate_with_mnemonic()?;
        (keys, Some(phrase))
    } else {
        println!("{}", "Generating random keys (no recovery phrase)...".cyan());
        println!(
            "{}",
            "Warning: Without a recovery phrase, losing your password means losing your funds!".yellow()
        );
        (StealthKeys::generate(), None)
    };

    println!();
    println!("{}", "Choose a strong password to encrypt your keys.".cyan());
    println!("{}", "Requirements: 8+ chars, uppercase, lowercase, and numbers".dimmed());
    println!();

    let password = prompt_new_password("Enter password: ")?;
    storage.save(&KeyData::from_keys(&keys), &password)?;

    println!();
    println!("{}", "Keys generated and encrypted successfully!".green().bold());
    println!();

    if let Some(ref phrase) = mnemonic {
        print_mnemonic(phrase);
    }

    println!("{}:", "Meta-Address (share this to receive donations)".yellow());
    println!("  {}", keys.meta_address());
    println!();
    println!("{}", format!("Encrypted keys saved to: {}", path.display()).dimmed());

    if mnemonic.is_none() && options.import_mnemonic.is_none() {
        println!();
        println!("{}", "IMPORTANT: You did not use a recovery phrase.".red().bold());
        println!(
            "{}",
            "If you lose your password, your funds are PERMANENTLY LOST.".red()
        );
    }

    Ok(())
}

fn print_mnemonic(phrase: &str) {
    println!("{}", "=== RECOVERY PHRASE - WRITE THIS DOWN! ===".red().bold());
    println!();
    println!("{}", "┌────────────────────────────────────────────────────────────┐".yellow());

    let words: Vec<&str> = phrase.split_whitespace().collect();
    for (i, chunk) in words.chunks(4).enumerate() {
        let line: String = chunk
            .iter()
            .enumerate()
            .map(|(j, word)| format!("{:2}. {:<12}", i * 4 + j + 1, word))
            .collect::<Vec<_>>()
            .join(" ");
        println!("│ {} │", format!("{:<58}", line).yellow());
    }

    println!("{}", "└────────────────────────────────────────────────────────────┘".yellow());
    println!();
    println!("{}", "Store this phrase OFFLINE. It will not be shown again.".red().bold());
    println!();
}
