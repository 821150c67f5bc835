//! Local private-key wallet
//!
//! Behaves like an injected browser wallet holding one account: it keeps its
//! own list of known networks, answers `switch_chain` for unknown chains with
//! the unrecognized-chain code, and emits account/chain notifications.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{ProviderEvent, WalletProvider};
use crate::error::{ClientError, ClientResult};
use crate::network::{
    chain_id_hex, AddChainParams, NativeCurrency, TEMPO_CHAIN_ID, UNRECOGNIZED_CHAIN_CODE,
};

/// JSON-RPC invalid params
const INVALID_PARAMS_CODE: i64 = -32602;

struct LocalWalletState {
    authorized: bool,
    active_chain: u64,
    chains: HashMap<u64, AddChainParams>,
}

pub struct LocalWallet {
    signer: PrivateKeySigner,
    state: Mutex<LocalWalletState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl LocalWallet {
    /// Create a wallet whose active (and only known) network is `network`
    pub fn new(signer: PrivateKeySigner, network: AddChainParams, authorized: bool) -> Result<Self> {
        let chain_id = network
            .numeric_chain_id()
            .ok_or_else(|| eyre!("Invalid chain id {:?}", network.chain_id))?;

        let (events, _) = broadcast::channel(16);
        let mut chains = HashMap::new();
        chains.insert(chain_id, network);

        Ok(Self {
            signer,
            state: Mutex::new(LocalWalletState {
                authorized,
                active_chain: chain_id,
                chains,
            }),
            events,
        })
    }

    pub fn from_private_key(
        private_key: &str,
        network: AddChainParams,
        authorized: bool,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        Self::new(signer, network, authorized)
    }

    /// Create a wallet attached to whatever chain `rpc_url` serves
    pub async fn detect(rpc_url: &str, private_key: &str, authorized: bool) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );
        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err_with(|| format!("Failed to query chain id from {}", rpc_url))?;

        let network = if chain_id == TEMPO_CHAIN_ID {
            AddChainParams::tempo_with_rpc(rpc_url)
        } else {
            AddChainParams {
                chain_id: chain_id_hex(chain_id),
                chain_name: format!("Chain {}", chain_id),
                native_currency: NativeCurrency {
                    name: "Ether".to_string(),
                    symbol: "ETH".to_string(),
                    decimals: 18,
                },
                rpc_urls: vec![rpc_url.to_string()],
                block_explorer_urls: Vec::new(),
            }
        };

        let wallet = Self::from_private_key(private_key, network, authorized)?;
        info!(
            address = %wallet.address(),
            chain_id,
            "Local wallet attached"
        );
        Ok(wallet)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Chains this wallet can switch to without an add request
    pub fn known_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.lock().chains.keys().copied().collect();
        chains.sort_unstable();
        chains
    }

    /// Revoke authorization, as when the user locks the wallet
    pub fn revoke(&self) {
        let was_authorized = std::mem::replace(&mut self.lock().authorized, false);
        if was_authorized {
            self.emit(ProviderEvent::AccountsChanged(Vec::new()));
        }
    }

    fn lock(&self) -> MutexGuard<'_, LocalWalletState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ProviderEvent) {
        debug!(event = ?event, "Wallet notification");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn activate(&self, chain_id: u64) {
        let changed = {
            let mut state = self.lock();
            std::mem::replace(&mut state.active_chain, chain_id) != chain_id
        };
        if changed {
            self.emit(ProviderEvent::ChainChanged(chain_id));
        }
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> ClientResult<Vec<Address>> {
        let newly_authorized = !std::mem::replace(&mut self.lock().authorized, true);
        let accounts = vec![self.address()];
        if newly_authorized {
            self.emit(ProviderEvent::AccountsChanged(accounts.clone()));
        }
        Ok(accounts)
    }

    async fn accounts(&self) -> ClientResult<Vec<Address>> {
        if self.lock().authorized {
            Ok(vec![self.address()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn chain_id(&self) -> ClientResult<u64> {
        Ok(self.lock().active_chain)
    }

    async fn switch_chain(&self, chain_id: u64) -> ClientResult<()> {
        if !self.lock().chains.contains_key(&chain_id) {
            return Err(ClientError::from_provider(
                UNRECOGNIZED_CHAIN_CODE,
                format!(
                    "Unrecognized chain ID \"{}\". Try adding the chain using wallet_addEthereumChain first.",
                    chain_id_hex(chain_id)
                ),
            ));
        }
        self.activate(chain_id);
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParams) -> ClientResult<()> {
        let chain_id = params.numeric_chain_id().ok_or_else(|| {
            ClientError::from_provider(INVALID_PARAMS_CODE, format!("Invalid chainId {:?}", params.chain_id))
        })?;

        if params.rpc_urls.is_empty() {
            return Err(ClientError::from_provider(
                INVALID_PARAMS_CODE,
                "rpcUrls must contain at least one endpoint",
            ));
        }
        for raw in params.rpc_urls.iter().chain(&params.block_explorer_urls) {
            url::Url::parse(raw).map_err(|e| {
                ClientError::from_provider(INVALID_PARAMS_CODE, format!("Invalid URL {}: {}", raw, e))
            })?;
        }

        self.lock().chains.insert(chain_id, params.clone());
        info!(chain_id, name = %params.chain_name, "Network added to wallet");

        // Wallets switch to a freshly added network
        self.activate(chain_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn signer(&self) -> Option<EthereumWallet> {
        Some(EthereumWallet::from(self.signer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Anvil account #0
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn mainnet_params() -> AddChainParams {
        AddChainParams {
            chain_id: "0x1".to_string(),
            chain_name: "Ethereum".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://eth.example.org".to_string()],
            block_explorer_urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_accounts_require_authorization() {
        let wallet = LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), false).unwrap();
        assert!(wallet.accounts().await.unwrap().is_empty());

        let mut events = wallet.subscribe();
        let accounts = wallet.request_accounts().await.unwrap();
        assert_eq!(accounts, vec![wallet.address()]);
        assert_eq!(wallet.accounts().await.unwrap(), accounts);
        assert_eq!(
            events.recv().await.unwrap(),
            ProviderEvent::AccountsChanged(accounts)
        );
    }

    #[tokio::test]
    async fn test_unknown_chain_reports_unrecognized() {
        let wallet = LocalWallet::from_private_key(TEST_KEY, mainnet_params(), true).unwrap();
        let err = wallet.switch_chain(TEMPO_CHAIN_ID).await.unwrap_err();
        assert!(err.is_unrecognized_chain());
        assert_eq!(wallet.chain_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_chain_switches_to_it() {
        let wallet = LocalWallet::from_private_key(TEST_KEY, mainnet_params(), true).unwrap();
        let mut events = wallet.subscribe();

        wallet.add_chain(&AddChainParams::tempo()).await.unwrap();

        assert_eq!(wallet.chain_id().await.unwrap(), TEMPO_CHAIN_ID);
        assert_eq!(wallet.known_chains(), vec![1, TEMPO_CHAIN_ID]);
        assert_eq!(
            events.recv().await.unwrap(),
            ProviderEvent::ChainChanged(TEMPO_CHAIN_ID)
        );
        wallet.switch_chain(1).await.unwrap();
        assert_eq!(wallet.chain_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_chain_rejects_bad_urls() {
        let wallet = LocalWallet::from_private_key(TEST_KEY, mainnet_params(), true).unwrap();
        let mut params = AddChainParams::tempo();
        params.rpc_urls = vec!["not a url".to_string()];
        let err = wallet.add_chain(&params).await.unwrap_err();
        assert!(matches!(err, ClientError::Provider { code: INVALID_PARAMS_CODE, .. }));
    }

    #[tokio::test]
    async fn test_revoke_emits_empty_accounts() {
        let wallet = LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), true).unwrap();
        let mut events = wallet.subscribe();
        wallet.revoke();
        assert_eq!(
            events.recv().await.unwrap(),
            ProviderEvent::AccountsChanged(Vec::new())
        );
        assert!(wallet.accounts().await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(LocalWallet::from_private_key("0x1234", AddChainParams::tempo(), true).is_err());
    }
}
