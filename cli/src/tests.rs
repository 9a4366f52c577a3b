//! Tests for the CLI's config, key storage and state file

#[cfg(test)]
mod config_tests {
    use std::io::Write;

    use stealth_scanner::config::ANNOUNCER_ADDRESS;
    use stealth_scanner::health::ProviderEndpoint;
    use stealth_scanner::Network;

    use crate::config::{resolve_env_ref, short_hex, CliConfig, Overrides};

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_mainnet_presets() {
        let cfg = CliConfig::default().resolve(None).unwrap();
        assert_eq!(cfg.scanner.providers, Network::Mainnet.default_providers());
    }

    #[test]
    fn test_toml_scanner_section() {
        let file = write_config(
            r#"
network = "sepolia"

[scanner]
blocks_per_request = 250
rescan_window = 12
"#,
        );
        let cfg = CliConfig::load(Some(file.path()), Overrides::default()).unwrap();
        assert_eq!(cfg.network, Some(Network::Sepolia));
        assert_eq!(cfg.scanner.blocks_per_request, 250);
        assert_eq!(cfg.scanner.rescan_window, 12);
        assert_eq!(cfg.scanner.providers, Network::Sepolia.default_providers());
    }

    #[test]
    fn test_explicit_providers_kept() {
        let file = write_config(
            r#"
[[scanner.providers]]
url = "https://rpc.example.org"
contract_address = "0x55649E01B5Df198D18D95b5cc5051630cfD45564"
"#,
        );
        let cfg = CliConfig::load(Some(file.path()), Overrides::default()).unwrap();
        assert_eq!(cfg.scanner.providers.len(), 1);
        assert_eq!(cfg.scanner.providers[0].url, "https://rpc.example.org");
        assert_eq!(cfg.scanner.providers[0].contract_address, ANNOUNCER_ADDRESS);
    }

    #[test]
    fn test_rpc_url_override_replaces_providers() {
        let cfg = CliConfig::default()
            .resolve(Some("http://localhost:8545".to_string()))
            .unwrap();
        assert_eq!(cfg.scanner.providers.len(), 1);
        assert_eq!(cfg.scanner.providers[0].url, "http://localhost:8545");
        assert_eq!(cfg.scanner.providers[0].contract_address, ANNOUNCER_ADDRESS);
    }

    #[test]
    fn test_network_override_discards_file_providers() {
        let file = write_config(
            r#"
[[scanner.providers]]
url = "https://rpc.example.org"
contract_address = "0x55649E01B5Df198D18D95b5cc5051630cfD45564"
"#,
        );
        let overrides = Overrides {
            network: Some(Network::Base),
            rpc_url: None,
        };
        let cfg = CliConfig::load(Some(file.path()), overrides).unwrap();
        assert_eq!(cfg.scanner.providers, Network::Base.default_providers());
    }

    #[test]
    fn test_api_key_env_ref_applied_to_providers() {
        std::env::set_var("CLI_TEST_ALCHEMY_KEY", "secret-key");
        let cfg = CliConfig {
            api_key: Some("env:CLI_TEST_ALCHEMY_KEY".to_string()),
            ..CliConfig::default()
        }
        .resolve(None)
        .unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("secret-key"));
        let urls: Vec<String> = cfg
            .scanner
            .providers
            .iter()
            .map(|p| ProviderEndpoint::from(p).request_url())
            .collect();
        assert_eq!(
            urls,
            [
                "https://eth-mainnet.g.alchemy.com/v2/secret-key",
                "https://cloudflare-eth.com",
            ]
        );
    }

    #[test]
    fn test_provider_key_wins_over_shared_key() {
        let toml = r#"
            api_key = "shared"

            [[scanner.providers]]
            url = "https://rpc.example/"
            contract_address = "0x55649E01B5Df198D18D95b5cc5051630cfD45564"
            api_key = "own"

            [[scanner.providers]]
            url = "https://node.example/rpc/"
            contract_address = "0x55649E01B5Df198D18D95b5cc5051630cfD45564"

            [[scanner.providers]]
            url = "https://public.example"
            contract_address = "0x55649E01B5Df198D18D95b5cc5051630cfD45564"
        "#;
        let file = write_config(toml);
        let cfg = CliConfig::load(Some(file.path()), Overrides::default()).unwrap();
        let urls: Vec<String> = cfg
            .scanner
            .providers
            .iter()
            .map(|p| ProviderEndpoint::from(p).request_url())
            .collect();
        assert_eq!(
            urls,
            [
                "https://rpc.example/own",
                "https://node.example/rpc/shared",
                "https://public.example",
            ]
        );
    }

    #[test]
    fn test_missing_env_ref_is_an_error() {
        let cfg = CliConfig {
            api_key: Some("env:CLI_TEST_DEFINITELY_UNSET".to_string()),
            ..CliConfig::default()
        };
        assert!(cfg.resolve(None).is_err());
    }

    #[test]
    fn test_invalid_scanner_settings_rejected() {
        let file = write_config("[scanner]\nblocks_per_request = 0\n");
        assert!(CliConfig::load(Some(file.path()), Overrides::default()).is_err());
    }

    #[test]
    fn test_resolve_env_ref() {
        assert_eq!(resolve_env_ref("plain").unwrap(), "plain");
        assert!(resolve_env_ref("env:").is_err());
        std::env::set_var("CLI_TEST_ENV_REF", "value");
        assert_eq!(resolve_env_ref("env: CLI_TEST_ENV_REF").unwrap(), "value");
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex("0x1234"), "0x1234");
        assert_eq!(
            short_hex("0x55649E01B5Df198D18D95b5cc5051630cfD45564"),
            "0x5564...5564"
        );
    }

    #[test]
    fn test_explicit_paths() {
        let cfg = CliConfig {
            key_file: Some("/tmp/k.enc".into()),
            state_file: Some("/tmp/s.json".into()),
            ..CliConfig::default()
        };
        assert_eq!(cfg.key_file().unwrap(), std::path::PathBuf::from("/tmp/k.enc"));
        assert_eq!(cfg.state_file().unwrap(), std::path::PathBuf::from("/tmp/s.json"));
    }
}

#[cfg(test)]
mod storage_tests {
    use stealth_scanner::{KeyVault, StealthKeys};

    use crate::secure_storage::{
        validate_password_strength, EncryptedKeyFile, FileKeyVault, KeyData, SecureKeyStorage,
    };

    const PASSWORD: &str = "Correct1Horse";

    #[test]
    fn test_encrypt_decrypt() {
        let keys = StealthKeys::from_secrets(&[3; 32], &[5; 32]);
        let data = KeyData::from_keys(&keys);

        let encrypted = EncryptedKeyFile::encrypt(&data, PASSWORD).unwrap();
        let decrypted = encrypted.decrypt(PASSWORD).unwrap();

        assert_eq!(decrypted.scan_secret, data.scan_secret);
        assert_eq!(decrypted.spend_secret, data.spend_secret);
        assert_eq!(decrypted.spend_pubkey, keys.spend_pubkey);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let data = KeyData::from_keys(&StealthKeys::generate());
        let encrypted = EncryptedKeyFile::encrypt(&data, PASSWORD).unwrap();
        assert!(encrypted.decrypt("Wrong1Password").is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let data = KeyData::from_keys(&StealthKeys::generate());
        let mut encrypted = EncryptedKeyFile::encrypt(&data, PASSWORD).unwrap();
        encrypted.password_hash = None;
        encrypted.ciphertext = encrypted.ciphertext.chars().rev().collect();
        assert!(encrypted.decrypt(PASSWORD).is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
        assert!(validate_password_strength(PASSWORD).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keys.enc");
        let storage = SecureKeyStorage::new(path.clone());
        storage
            .save(&KeyData::from_keys(&StealthKeys::generate()), PASSWORD)
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_file_vault_lock_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.enc");
        let keys = StealthKeys::from_secrets(&[11; 32], &[13; 32]);
        SecureKeyStorage::new(path.clone())
            .save(&KeyData::from_keys(&keys), PASSWORD)
            .unwrap();

        let vault = FileKeyVault::new(path);
        assert!(vault.active_key_material().await.is_none());

        assert!(vault.unlock("Wrong1Password").is_err());
        assert!(vault.active_key_material().await.is_none());

        vault.unlock(PASSWORD).unwrap();
        let material = vault.active_key_material().await.unwrap();
        assert_eq!(material.viewing_key(), &keys.export_secrets().0);
        assert_eq!(material.spending_key(), &keys.export_secrets().1);

        vault.lock();
        assert!(vault.active_key_material().await.is_none());
    }
}

#[cfg(test)]
mod state_file_tests {
    use alloy_primitives::{Address, B256, U256};
    use stealth_scanner::{BreakerState, CircuitBreakerStatus, DonationRecord, ScanMetrics, StateStore};

    use crate::state_file::JsonStateStore;

    fn donation(block: u64, byte: u8) -> DonationRecord {
        let tx_hash = B256::repeat_byte(byte);
        let stealth_address = Address::repeat_byte(byte);
        DonationRecord {
            id: DonationRecord::id_for(&tx_hash, &stealth_address),
            stealth_address,
            amount: U256::from(1_000u64),
            token: None,
            block_number: block,
            tx_hash,
            timestamp: chrono::Utc::now(),
            swept: false,
            memo: String::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), 0);
        assert!(store.list_donations().await.unwrap().is_empty());
        assert!(store.load_metrics().await.unwrap().is_none());
        assert!(store.load_breaker_status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = JsonStateStore::open(path.clone()).unwrap();
            store.save_cursor(4_242).await.unwrap();
            assert!(store.upsert_donation(&donation(10, 1)).await.unwrap());
            let metrics = ScanMetrics {
                total_scans: 3,
                ..ScanMetrics::default()
            };
            store.save_metrics(&metrics).await.unwrap();
            store
                .save_breaker_status(&CircuitBreakerStatus {
                    state: BreakerState::Open,
                    consecutive_failures: 5,
                    last_failure_at: Some(chrono::Utc::now()),
                })
                .await
                .unwrap();
        }

        let store = JsonStateStore::open(path).unwrap();
        assert_eq!(store.load_cursor().await.unwrap(), 4_242);
        assert_eq!(store.list_donations().await.unwrap().len(), 1);
        assert_eq!(store.load_metrics().await.unwrap().unwrap().total_scans, 3);
        let breaker = store.load_breaker_status().await.unwrap().unwrap();
        assert_eq!(breaker.state, BreakerState::Open);
        assert_eq!(breaker.consecutive_failures, 5);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path().join("state.json")).unwrap();

        assert!(store.upsert_donation(&donation(10, 1)).await.unwrap());
        assert!(!store.upsert_donation(&donation(10, 1)).await.unwrap());
        assert!(store.upsert_donation(&donation(5, 2)).await.unwrap());

        let listed = store.list_donations().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].block_number, 5);
    }

    #[tokio::test]
    async fn test_two_stores_on_one_file_keep_each_others_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        // A long-running watch process with an open breaker at block 100
        let watch = JsonStateStore::open(path.clone()).unwrap();
        watch.save_cursor(100).await.unwrap();
        watch
            .save_breaker_status(&CircuitBreakerStatus {
                state: BreakerState::Open,
                consecutive_failures: 5,
                last_failure_at: Some(chrono::Utc::now()),
            })
            .await
            .unwrap();

        // An operator command opened after it resets the breaker and rewinds
        let operator = JsonStateStore::open(path.clone()).unwrap();
        operator
            .save_breaker_status(&CircuitBreakerStatus {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            })
            .await
            .unwrap();
        operator.save_cursor(50).await.unwrap();

        // The watch process then writes an unrelated field
        watch
            .save_metrics(&ScanMetrics {
                total_scans: 7,
                ..ScanMetrics::default()
            })
            .await
            .unwrap();
        assert!(watch.upsert_donation(&donation(60, 3)).await.unwrap());

        let reopened = JsonStateStore::open(path).unwrap();
        let breaker = reopened.load_breaker_status().await.unwrap().unwrap();
        assert_eq!(breaker.state, BreakerState::Closed);
        assert_eq!(reopened.load_cursor().await.unwrap(), 50);
        assert_eq!(reopened.load_metrics().await.unwrap().unwrap().total_scans, 7);
        assert_eq!(reopened.list_donations().await.unwrap().len(), 1);

        // Both handles see the operator's writes without reopening
        assert_eq!(watch.load_cursor().await.unwrap(), 50);
        assert!(!operator.upsert_donation(&donation(60, 3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path().join("state.json")).unwrap();
        store.save_cursor(1).await.unwrap();

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["state.json".to_string(), "state.json.lock".to_string()]);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonStateStore::open(path).is_err());
    }
}

#[cfg(test)]
mod mnemonic_tests {
    use crate::mnemonic::{generate_with_mnemonic, keys_from_mnemonic};

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_mnemonic_determinism() {
        let keys1 = keys_from_mnemonic(PHRASE, "").unwrap();
        let keys2 = keys_from_mnemonic(PHRASE, "").unwrap();
        assert_eq!(keys1.scan_pubkey, keys2.scan_pubkey);
        assert_eq!(keys1.spend_pubkey, keys2.spend_pubkey);
        assert_ne!(keys1.scan_pubkey, keys1.spend_pubkey);
    }

    #[test]
    fn test_mnemonic_passphrase_sensitivity() {
        let keys1 = keys_from_mnemonic(PHRASE, "").unwrap();
        let keys2 = keys_from_mnemonic(PHRASE, "different").unwrap();
        assert_ne!(keys1.scan_pubkey, keys2.scan_pubkey);
        assert_ne!(keys1.spend_pubkey, keys2.spend_pubkey);
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        assert!(keys_from_mnemonic("not a real phrase", "").is_err());
    }

    #[test]
    fn test_generated_phrase_recovers_keys() {
        let (keys, phrase) = generate_with_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);

        let recovered = keys_from_mnemonic(&phrase, "").unwrap();
        assert_eq!(recovered.meta_address(), keys.meta_address());
    }
}

#[cfg(test)]
mod cli_args_tests {
    use clap::Parser;

    use crate::{Cli, Commands};

    fn keygen(args: &[&str]) -> (bool, Option<String>) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Keygen { no_mnemonic, import_mnemonic, .. } => (no_mnemonic, import_mnemonic),
            _ => panic!("expected keygen"),
        }
    }

    #[test]
    fn test_keygen_uses_mnemonic_by_default() {
        assert_eq!(keygen(&["donation-scanner", "keygen"]), (false, None));
    }

    #[test]
    fn test_keygen_no_mnemonic_flag() {
        assert_eq!(keygen(&["donation-scanner", "keygen", "--no-mnemonic"]), (true, None));
    }

    #[test]
    fn test_no_mnemonic_conflicts_with_import() {
        let parsed = Cli::try_parse_from([
            "donation-scanner",
            "keygen",
            "--no-mnemonic",
            "--import-mnemonic",
            "abandon about",
        ]);
        assert!(parsed.is_err());
    }
}
