use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result, bail};
use domain::WalletConfig;

/// Immutable mapping from wallet id to proxy address and display name.
/// Loaded once at process start; a missing or malformed registry file is
/// fatal before the server ever binds.
pub struct WalletRegistry {
    wallets: Vec<WalletConfig>,
}

impl WalletRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read wallet registry {}", path.display()))?;
        let wallets: Vec<WalletConfig> = serde_json::from_str(&raw)
            .with_context(|| format!("wallet registry {} is not valid JSON", path.display()))?;
        Self::from_wallets(wallets)
    }

    pub fn from_wallets(wallets: Vec<WalletConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for wallet in &wallets {
            if wallet.id.trim().is_empty() {
                bail!("wallet registry contains an entry with an empty id");
            }
            if !seen.insert(wallet.id.as_str()) {
                bail!("wallet registry contains duplicate id {}", wallet.id);
            }
            if wallet.proxy_address.trim().is_empty() {
                bail!("wallet {} has an empty proxy address", wallet.id);
            }
        }
        Ok(Self { wallets })
    }

    pub fn all(&self) -> &[WalletConfig] {
        &self.wallets
    }

    pub fn enabled(&self) -> impl Iterator<Item = &WalletConfig> {
        self.wallets.iter().filter(|wallet| wallet.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&WalletConfig> {
        self.wallets.iter().find(|wallet| wallet.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(id: &str, proxy_address: &str) -> WalletConfig {
        WalletConfig {
            id: id.to_string(),
            name: format!("Wallet {id}"),
            proxy_address: proxy_address.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn accepts_distinct_wallets_and_filters_disabled() {
        let mut disabled = wallet("w2", "0xbbb");
        disabled.enabled = false;
        let registry =
            WalletRegistry::from_wallets(vec![wallet("w1", "0xaaa"), disabled]).expect("valid");

        assert_eq!(registry.all().len(), 2);
        let enabled: Vec<_> = registry.enabled().map(|w| w.id.as_str()).collect();
        assert_eq!(enabled, vec!["w1"]);
        assert!(registry.get("w2").is_some());
        assert!(registry.get("w3").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = WalletRegistry::from_wallets(vec![wallet("w1", "0xaaa"), wallet("w1", "0xbbb")]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_proxy_address() {
        let result = WalletRegistry::from_wallets(vec![wallet("w1", "  ")]);
        assert!(result.is_err());
    }

    #[test]
    fn load_fails_for_missing_file() {
        assert!(WalletRegistry::load("/nonexistent/wallets.json").is_err());
    }

    #[test]
    fn load_parses_registry_file() {
        let path = std::env::temp_dir().join("wallet-registry-load-test.json");
        fs::write(
            &path,
            r#"[{"id": "w1", "name": "Main", "proxy_address": "0xaaa"}]"#,
        )
        .expect("write registry");

        let registry = WalletRegistry::load(&path).expect("load registry");
        fs::remove_file(&path).ok();

        // `enabled` defaults to true when the file omits it.
        assert_eq!(registry.enabled().count(), 1);
        assert_eq!(registry.get("w1").unwrap().name, "Main");
    }
}
