//! CLI configuration and file locations
//!
//! Settings come from `~/.stealth-scanner/config.toml` (or `--config`).
//! String values of the form `env:VAR` are read from the environment, and
//! `SCANNER_RPC_URL` replaces the provider list with a single endpoint.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use stealth_scanner::config::ANNOUNCER_ADDRESS;
use stealth_scanner::{Network, ProviderConfig, ScannerConfig};

/// Default directory for keys, state and config
const SCANNER_DIR: &str = ".stealth-scanner";
const CONFIG_FILE: &str = "config.toml";
const KEYS_FILE: &str = "keys.enc";
const STATE_FILE: &str = "state.json";

/// Overrides the configured providers with one endpoint
pub const RPC_URL_ENV: &str = "SCANNER_RPC_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Preset used when no providers are configured
    pub network: Option<Network>,
    /// Appended to provider urls ending in `/` that have no key of their own
    pub api_key: Option<String>,
    pub key_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub scanner: ScannerConfig,
}

/// Get the scanner directory path
pub fn scanner_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(SCANNER_DIR))
        .ok_or_else(|| anyhow!("Could not find home directory"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(scanner_dir()?.join(CONFIG_FILE))
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network: Option<Network>,
    pub rpc_url: Option<String>,
}

impl CliConfig {
    /// Load from `path`, or from the default location if it exists
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_toml(path)?,
            None => {
                let default = default_config_path()?;
                if default.exists() {
                    Self::from_toml(&default)?
                } else {
                    Self::default()
                }
            }
        };
        if let Some(network) = overrides.network {
            cfg.network = Some(network);
            cfg.scanner.providers.clear();
        }
        cfg.resolve(overrides.rpc_url)
    }

    pub fn from_toml(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config file: {}", path.display()))?;
        toml::from_str(&raw).context("failed parsing config toml")
    }

    /// Apply presets, the single-endpoint override and `env:` references
    pub fn resolve(mut self, rpc_url: Option<String>) -> Result<Self> {
        let network = self.network.unwrap_or(Network::Mainnet);
        if self.scanner.providers.is_empty() {
            self.scanner.providers = network.default_providers();
        }

        if let Some(url) = rpc_url.or_else(|| env::var(RPC_URL_ENV).ok()) {
            if !url.trim().is_empty() {
                let contract = self
                    .scanner
                    .providers
                    .first()
                    .map(|p| p.contract_address)
                    .unwrap_or(ANNOUNCER_ADDRESS);
                self.scanner.providers = vec![ProviderConfig::new(url, contract)];
            }
        }

        let api_key = self.api_key.as_deref().map(resolve_env_ref).transpose()?;
        for provider in &mut self.scanner.providers {
            provider.url = resolve_env_ref(&provider.url)?;
            provider.api_key = match provider.api_key.as_deref() {
                Some(key) => Some(resolve_env_ref(key)?),
                // Only key-in-path endpoints such as `.../v2/` take the shared key
                None if provider.url.ends_with('/') => api_key.clone(),
                None => None,
            };
        }
        self.api_key = api_key;

        if let Err(err) = self.scanner.validate() {
            bail!("{err}");
        }
        Ok(self)
    }

    pub fn key_file(&self) -> Result<PathBuf> {
        match &self.key_file {
            Some(path) => Ok(path.clone()),
            None => Ok(scanner_dir()?.join(KEYS_FILE)),
        }
    }

    pub fn state_file(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(scanner_dir()?.join(STATE_FILE)),
        }
    }
}

pub fn resolve_env_ref(value: &str) -> Result<String> {
    const PREFIX: &str = "env:";
    if let Some(var) = value.strip_prefix(PREFIX) {
        let var = var.trim();
        if var.is_empty() {
            bail!("invalid env ref: {value}");
        }
        return env::var(var).with_context(|| format!("missing env var {var} for {value}"));
    }
    Ok(value.to_string())
}

/// Shorten an address or hash for display
pub fn short_hex(value: &str) -> String {
    if value.len() <= 12 {
        return value.to_string();
    }
    format!("{}...{}", &value[..6], &value[value.len() - 4..])
}
