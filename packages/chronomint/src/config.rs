//! Client configuration
//!
//! Loaded from environment variables, optionally seeded from a `.env` file.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use eyre::{bail, eyre, Result, WrapErr};
use tracing::warn;

use crate::ledger::LedgerAddresses;
use crate::network::TEMPO_RPC_URL;

pub const DEFAULT_PRESALE_END: &str = "2026-03-01T00:00:00Z";

/// Which ledger backs the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Live,
    Synthetic,
}

impl FromStr for DataSource {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(DataSource::Live),
            "synthetic" | "demo" | "fixture" => Ok(DataSource::Synthetic),
            other => Err(eyre!("Invalid DATA_SOURCE {:?} (expected live or synthetic)", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    /// Read RPC endpoint
    pub rpc_url: String,
    pub data_source: DataSource,
    /// Set when `data_source` is live
    pub contracts: Option<LedgerAddresses>,
    /// Local wallet key; none means no wallet provider
    pub private_key: Option<String>,
    /// Treat the local key as already authorized
    pub auto_connect: bool,
    pub presale_poll_ms: u64,
    pub balance_poll_ms: u64,
    pub activity_poll_ms: u64,
    /// Delay before re-reading presale state after a purchase
    pub purchase_settle_ms: u64,
    pub presale_end: DateTime<Utc>,
    pub health_bind: String,
    pub health_port: u16,
}

/// Custom Debug that redacts the private key
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url)
            .field("data_source", &self.data_source)
            .field("contracts", &self.contracts)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("auto_connect", &self.auto_connect)
            .field("presale_poll_ms", &self.presale_poll_ms)
            .field("balance_poll_ms", &self.balance_poll_ms)
            .field("activity_poll_ms", &self.activity_poll_ms)
            .field("purchase_settle_ms", &self.purchase_settle_ms)
            .field("presale_end", &self.presale_end)
            .field("health_bind", &self.health_bind)
            .field("health_port", &self.health_port)
            .finish()
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| eyre!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

/// Poll interval in milliseconds; zero would spin the poller
fn interval_ms(key: &str, default: u64) -> Result<u64> {
    let ms = parse_or(key, default)?;
    if ms == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(ms)
}

fn address(key: &str) -> Result<Option<Address>> {
    optional(key)
        .map(|raw| {
            raw.parse::<Address>()
                .map_err(|e| eyre!("Invalid {} {:?}: {}", key, raw, e))
        })
        .transpose()
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let presale = address("PRESALE_ADDRESS")?;
        let payment_token = address("PAYMENT_TOKEN_ADDRESS")?;
        let reward_token = address("CHRONO_TOKEN_ADDRESS")?;
        let airdrop = address("AIRDROP_ADDRESS")?;

        let contracts = match (presale, payment_token, reward_token, airdrop) {
            (Some(presale), Some(payment_token), Some(reward_token), Some(airdrop)) => {
                Some(LedgerAddresses {
                    presale,
                    payment_token,
                    reward_token,
                    airdrop,
                })
            }
            _ => None,
        };

        let data_source = match optional("DATA_SOURCE") {
            Some(raw) => raw.parse()?,
            None if contracts.is_some() => DataSource::Live,
            None => {
                warn!("Contract addresses not configured, using synthetic data");
                DataSource::Synthetic
            }
        };
        if data_source == DataSource::Live && contracts.is_none() {
            return Err(eyre!(
                "DATA_SOURCE=live requires PRESALE_ADDRESS, PAYMENT_TOKEN_ADDRESS, CHRONO_TOKEN_ADDRESS and AIRDROP_ADDRESS"
            ));
        }

        let presale_end_raw =
            optional("PRESALE_END").unwrap_or_else(|| DEFAULT_PRESALE_END.to_string());
        let presale_end = DateTime::parse_from_rfc3339(&presale_end_raw)
            .wrap_err_with(|| format!("Invalid PRESALE_END {:?}", presale_end_raw))?
            .with_timezone(&Utc);

        let rpc_url = optional("TEMPO_RPC_URL").unwrap_or_else(|| TEMPO_RPC_URL.to_string());
        url::Url::parse(&rpc_url).wrap_err_with(|| format!("Invalid TEMPO_RPC_URL {:?}", rpc_url))?;

        Ok(Self {
            rpc_url,
            data_source,
            contracts: if data_source == DataSource::Live {
                contracts
            } else {
                None
            },
            private_key: optional("WALLET_PRIVATE_KEY"),
            auto_connect: parse_or("WALLET_AUTO_CONNECT", false)?,
            presale_poll_ms: interval_ms("PRESALE_POLL_MS", 15_000)?,
            balance_poll_ms: interval_ms("BALANCE_POLL_MS", 10_000)?,
            activity_poll_ms: interval_ms("ACTIVITY_POLL_MS", 10_000)?,
            purchase_settle_ms: parse_or("PURCHASE_SETTLE_MS", 2_000)?,
            presale_end,
            health_bind: optional("HEALTH_BIND").unwrap_or_else(|| "127.0.0.1".to_string()),
            health_port: parse_or("HEALTH_PORT", 9190)?,
        })
    }

    /// Defaults with the synthetic ledger and no wallet
    pub fn synthetic() -> Self {
        Self {
            rpc_url: TEMPO_RPC_URL.to_string(),
            data_source: DataSource::Synthetic,
            contracts: None,
            private_key: None,
            auto_connect: false,
            presale_poll_ms: 15_000,
            balance_poll_ms: 10_000,
            activity_poll_ms: 10_000,
            purchase_settle_ms: 2_000,
            presale_end: DateTime::parse_from_rfc3339(DEFAULT_PRESALE_END)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            health_bind: "127.0.0.1".to_string(),
            health_port: 9190,
        }
    }

    pub fn presale_poll(&self) -> Duration {
        Duration::from_millis(self.presale_poll_ms)
    }

    pub fn balance_poll(&self) -> Duration {
        Duration::from_millis(self.balance_poll_ms)
    }

    pub fn activity_poll(&self) -> Duration {
        Duration::from_millis(self.activity_poll_ms)
    }

    pub fn purchase_settle(&self) -> Duration {
        Duration::from_millis(self.purchase_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "TEMPO_RPC_URL",
        "DATA_SOURCE",
        "PRESALE_ADDRESS",
        "PAYMENT_TOKEN_ADDRESS",
        "CHRONO_TOKEN_ADDRESS",
        "AIRDROP_ADDRESS",
        "WALLET_PRIVATE_KEY",
        "WALLET_AUTO_CONNECT",
        "PRESALE_POLL_MS",
        "BALANCE_POLL_MS",
        "ACTIVITY_POLL_MS",
        "PURCHASE_SETTLE_MS",
        "PRESALE_END",
        "HEALTH_BIND",
        "HEALTH_PORT",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    fn set_addresses() {
        env::set_var("PRESALE_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        env::set_var("PAYMENT_TOKEN_ADDRESS", "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
        env::set_var("CHRONO_TOKEN_ADDRESS", "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
        env::set_var("AIRDROP_ADDRESS", "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");
    }

    #[test]
    #[serial]
    fn test_defaults_without_addresses() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.data_source, DataSource::Synthetic);
        assert_eq!(config.rpc_url, TEMPO_RPC_URL);
        assert_eq!(config.presale_poll_ms, 15_000);
        assert_eq!(config.balance_poll_ms, 10_000);
        assert_eq!(config.purchase_settle_ms, 2_000);
        assert_eq!(config.health_port, 9190);
        assert_eq!(config.presale_end.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(config.private_key.is_none());
        assert!(!config.auto_connect);
    }

    #[test]
    #[serial]
    fn test_all_addresses_select_live() {
        clear_env();
        set_addresses();
        let config = Config::from_env().unwrap();
        assert_eq!(config.data_source, DataSource::Live);
        assert!(config.contracts.is_some());

        env::set_var("DATA_SOURCE", "synthetic");
        let config = Config::from_env().unwrap();
        assert_eq!(config.data_source, DataSource::Synthetic);
        assert!(config.contracts.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_live_requires_addresses() {
        clear_env();
        env::set_var("DATA_SOURCE", "live");
        env::set_var("PRESALE_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        env::set_var("HEALTH_PORT", "not-a-port");
        assert!(Config::from_env().is_err());

        clear_env();
        env::set_var("PRESALE_ADDRESS", "0x1234");
        assert!(Config::from_env().is_err());

        clear_env();
        env::set_var("DATA_SOURCE", "mainnet");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_rejected() {
        for key in ["PRESALE_POLL_MS", "BALANCE_POLL_MS", "ACTIVITY_POLL_MS"] {
            clear_env();
            env::set_var(key, "0");
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains(key));
        }

        clear_env();
        env::set_var("PURCHASE_SETTLE_MS", "0");
        assert_eq!(Config::from_env().unwrap().purchase_settle_ms, 0);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_debug_redacts_private_key() {
        clear_env();
        env::set_var(
            "WALLET_PRIVATE_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let config = Config::from_env().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("ac0974bec39a17e3"));
        clear_env();
    }
}
