//! Application configuration loaded from environment variables.

use std::collections::HashMap;

use alloy_primitives::Address;

use crate::errors::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint of the connected chain
    pub rpc_url: String,
    pub chain_id: u64,
    /// Connected account; resolved from the node's `eth_accounts` when unset
    pub account: Option<Address>,
    /// Project registry deployed on `chain_id`
    pub registry: Address,
    /// Subgraph endpoint per chain id
    pub subgraph_urls: HashMap<u64, String>,
    pub pinata_jwt: Option<String>,
    pub pinata_api_url: String,
    pub ipfs_gateway_url: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to re-sync projects; `0` disables the loop
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Rounds on this deployment accept a `bytes32` project id
    pub apply_with_project_id: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let chain_id: u64 = parse(&var("CHAIN_ID", "1"), "CHAIN_ID")?;

        let mut subgraph_urls = match lookup("SUBGRAPH_URLS") {
            Some(raw) => parse_endpoints(&raw)?,
            None => HashMap::new(),
        };
        if let Some(url) = lookup("SUBGRAPH_URL") {
            subgraph_urls.insert(chain_id, url);
        }

        Ok(Config {
            rpc_url: var("RPC_URL", "http://localhost:8545"),
            chain_id,
            account: lookup("ACCOUNT")
                .map(|raw| raw.parse::<Address>())
                .transpose()
                .map_err(|_| ClientError::Config("Invalid ACCOUNT".to_string()))?,
            registry: lookup("PROJECT_REGISTRY_ADDRESS")
                .ok_or_else(|| {
                    ClientError::Config(
                        "PROJECT_REGISTRY_ADDRESS environment variable is required".to_string(),
                    )
                })?
                .parse::<Address>()
                .map_err(|_| ClientError::Config("Invalid PROJECT_REGISTRY_ADDRESS".to_string()))?,
            subgraph_urls,
            pinata_jwt: lookup("PINATA_JWT").filter(|jwt| !jwt.is_empty()),
            pinata_api_url: var("PINATA_API_URL", "https://api.pinata.cloud"),
            ipfs_gateway_url: var("IPFS_GATEWAY_URL", "https://gateway.pinata.cloud"),
            database_url: var("DATABASE_URL", "sqlite:./grants_client.db"),
            api_port: parse(&var("API_PORT", "3001"), "API_PORT")?,
            refresh_interval_secs: parse(&var("REFRESH_INTERVAL_SECS", "60"), "REFRESH_INTERVAL_SECS")?,
            request_timeout_secs: parse(&var("REQUEST_TIMEOUT_SECS", "30"), "REQUEST_TIMEOUT_SECS")?,
            apply_with_project_id: parse(&var("APPLY_WITH_PROJECT_ID", "false"), "APPLY_WITH_PROJECT_ID")?,
        })
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("Invalid {key}")))
}

/// `chain=url,chain=url`
fn parse_endpoints(raw: &str) -> Result<HashMap<u64, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (chain, url) = entry
                .split_once('=')
                .ok_or_else(|| ClientError::Config(format!("Invalid SUBGRAPH_URLS entry: {entry}")))?;
            Ok((parse(chain, "SUBGRAPH_URLS chain id")?, url.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = "0x8e5da2b8e9f7d4c5a6b3c2d1e0f9a8b7c6d5e4f3";

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_need_only_the_registry() {
        let config = load(&[("PROJECT_REGISTRY_ADDRESS", REGISTRY)]).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.registry, REGISTRY.parse::<Address>().unwrap());
        assert_eq!(config.api_port, 3001);
        assert!(config.account.is_none());
        assert!(!config.apply_with_project_id);
        assert!(config.subgraph_urls.is_empty());
    }

    #[test]
    fn missing_registry_is_a_config_error() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn subgraph_endpoints_merge_per_chain() {
        let config = load(&[
            ("PROJECT_REGISTRY_ADDRESS", REGISTRY),
            ("CHAIN_ID", "250"),
            ("SUBGRAPH_URLS", "1=https://a.example, 10=https://b.example"),
            ("SUBGRAPH_URL", "https://fantom.example"),
        ])
        .unwrap();
        assert_eq!(config.subgraph_urls.len(), 3);
        assert_eq!(config.subgraph_urls[&10], "https://b.example");
        assert_eq!(config.subgraph_urls[&250], "https://fantom.example");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("PROJECT_REGISTRY_ADDRESS", "0x12")]).is_err());
        assert!(load(&[("PROJECT_REGISTRY_ADDRESS", REGISTRY), ("API_PORT", "http")]).is_err());
        assert!(load(&[("PROJECT_REGISTRY_ADDRESS", REGISTRY), ("SUBGRAPH_URLS", "mainnet")]).is_err());
        assert!(load(&[("PROJECT_REGISTRY_ADDRESS", REGISTRY), ("APPLY_WITH_PROJECT_ID", "yes")]).is_err());
    }
}
