//! Wallet provider boundary
//!
//! Models an injected EIP-1193 wallet: account access, chain selection and
//! change notifications. The session manager is the only consumer.
//!
//! ## Submodules
//!
//! - `local` - wallet backed by a local private key

pub mod local;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ClientResult;
use crate::network::AddChainParams;

pub use local::LocalWallet;

/// Provider-level notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Authorized account list changed; empty means locked/revoked
    AccountsChanged(Vec<Address>),
    /// Active chain changed
    ChainChanged(u64),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Interactive account request (`eth_requestAccounts`)
    async fn request_accounts(&self) -> ClientResult<Vec<Address>>;

    /// Already authorized accounts, never prompts (`eth_accounts`)
    async fn accounts(&self) -> ClientResult<Vec<Address>>;

    /// Active chain (`eth_chainId`)
    async fn chain_id(&self) -> ClientResult<u64>;

    /// `wallet_switchEthereumChain`
    async fn switch_chain(&self, chain_id: u64) -> ClientResult<()>;

    /// `wallet_addEthereumChain`
    async fn add_chain(&self, params: &AddChainParams) -> ClientResult<()>;

    /// Subscribe to notifications; dropping the receiver unsubscribes
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Signing wallet for write transactions, if the provider can sign
    fn signer(&self) -> Option<EthereumWallet>;
}
