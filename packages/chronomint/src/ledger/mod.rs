//! Remote ledger boundary
//!
//! [`LedgerSource`] covers every contract read and write the client needs.
//! Two implementations are selected by configuration:
//!
//! - `live` - JSON-RPC against the deployed contracts (alloy)
//! - `fixture` - synthetic demo ledger with simulated writes
//!
//! `contracts` holds the sol! bindings used by the live source.

pub mod contracts;
pub mod fixture;
pub mod live;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::fetch::DataOrigin;
use crate::units::{NATIVE_DECIMALS, PAYMENT_DECIMALS, REWARD_DECIMALS};

pub use fixture::SyntheticLedger;
pub use live::{LedgerAddresses, LiveLedger};

/// Tokens the client tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// TEMPO, the network's native currency
    Native,
    /// USDC, spent in the presale
    Payment,
    /// CHRONO, sold in the presale and airdropped
    Reward,
}

impl TokenKind {
    pub fn decimals(self) -> u8 {
        match self {
            TokenKind::Native => NATIVE_DECIMALS,
            TokenKind::Payment => PAYMENT_DECIMALS,
            TokenKind::Reward => REWARD_DECIMALS,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TokenKind::Native => "TEMPO",
            TokenKind::Payment => "USDC",
            TokenKind::Reward => "CHRONO",
        }
    }
}

/// Presale-wide accessors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresaleTotals {
    pub total_raised: U256,
    pub hard_cap: U256,
    pub rate: U256,
}

/// Which side of a transfer the account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

/// Decoded reward-token Transfer log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Confirmed transaction summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Handle to a submitted transaction
pub struct PendingTx {
    tx_hash: B256,
    confirmation: BoxFuture<'static, ClientResult<TxReceipt>>,
}

impl PendingTx {
    pub fn new(tx_hash: B256, confirmation: BoxFuture<'static, ClientResult<TxReceipt>>) -> Self {
        Self {
            tx_hash,
            confirmation,
        }
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Wait for inclusion. A reverted receipt is an error.
    pub async fn confirmed(self) -> ClientResult<TxReceipt> {
        let receipt = self.confirmation.await?;
        if !receipt.success {
            return Err(ClientError::Revert(format!(
                "Transaction {} reverted",
                receipt.tx_hash
            )));
        }
        Ok(receipt)
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx")
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Short name for logs and metrics ("live", "synthetic")
    fn label(&self) -> &'static str;

    /// Origin of values read from this ledger when no read fails
    fn origin(&self) -> DataOrigin;

    async fn presale_totals(&self) -> ClientResult<PresaleTotals>;

    /// Payment-token amount the account has contributed to the presale
    async fn contribution(&self, account: Address) -> ClientResult<U256>;

    /// Balance of `token` (native balance for [`TokenKind::Native`])
    async fn balance(&self, token: TokenKind, account: Address) -> ClientResult<U256>;

    /// Payment-token allowance granted by `owner` to the presale contract
    async fn payment_allowance(&self, owner: Address) -> ClientResult<U256>;

    async fn is_eligible(&self, account: Address) -> ClientResult<bool>;

    async fn has_claimed(&self, account: Address) -> ClientResult<bool>;

    /// CHRONO base units paid per claim
    async fn airdrop_amount(&self) -> ClientResult<U256>;

    async fn latest_block(&self) -> ClientResult<u64>;

    /// Reward-token transfers involving `account` in `[from_block, to_block]`
    async fn reward_transfers(
        &self,
        direction: TransferDirection,
        account: Address,
        from_block: u64,
        to_block: u64,
    ) -> ClientResult<Vec<TransferLog>>;

    /// Block timestamp in unix seconds
    async fn block_timestamp(&self, block_number: u64) -> ClientResult<u64>;

    /// Approve the presale contract to spend `amount` payment-token base units
    async fn approve_payment(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx>;

    async fn buy_tokens(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx>;

    async fn claim_airdrop(&self, wallet: &EthereumWallet) -> ClientResult<PendingTx>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reverted_receipt_is_error() {
        let hash = B256::repeat_byte(0xab);
        let pending = PendingTx::new(
            hash,
            Box::pin(async move {
                Ok(TxReceipt {
                    tx_hash: hash,
                    block_number: Some(7),
                    success: false,
                })
            }),
        );
        assert_eq!(pending.tx_hash(), hash);
        assert!(matches!(pending.confirmed().await, Err(ClientError::Revert(_))));
    }

    #[test]
    fn test_token_precision() {
        assert_eq!(TokenKind::Payment.decimals(), 6);
        assert_eq!(TokenKind::Reward.decimals(), 18);
        assert_eq!(TokenKind::Native.decimals(), 18);
        assert_eq!(TokenKind::Reward.symbol(), "CHRONO");
    }
}
