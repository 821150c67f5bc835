//! JSON-RPC ledger
//!
//! Reads go through a shared read-only provider. Writes build a short-lived
//! provider around the caller's wallet so every submission is signed by the
//! connected account.

use std::future::Future;

use alloy::{
    eips::BlockNumberOrTag,
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{BlockTransactionsKind, Filter, TransactionReceipt},
    sol_types::SolEvent,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use futures::FutureExt;
use tracing::{debug, info, warn};
use url::Url;

use super::contracts::{Airdrop, Presale, ERC20};
use super::{
    LedgerSource, PendingTx, PresaleTotals, TokenKind, TransferDirection, TransferLog, TxReceipt,
};
use crate::error::{ClientError, ClientResult};
use crate::fetch::DataOrigin;

/// Deployed contract addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerAddresses {
    pub presale: Address,
    pub payment_token: Address,
    pub reward_token: Address,
    pub airdrop: Address,
}

pub struct LiveLedger {
    rpc_url: Url,
    provider: RootProvider<Http<Client>>,
    addresses: LedgerAddresses,
}

fn read_err(what: &str) -> impl FnOnce(alloy::contract::Error) -> ClientError + '_ {
    move |e| ClientError::Read(format!("{}: {}", what, e))
}

fn write_err(e: alloy::contract::Error) -> ClientError {
    ClientError::from_write_failure(e.to_string())
}

fn summarize(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        success: receipt.status(),
    }
}

impl LiveLedger {
    pub fn new(rpc_url: &str, addresses: LedgerAddresses) -> Result<Self> {
        let rpc_url: Url = rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid RPC URL: {}", e))?;
        let provider = ProviderBuilder::new().on_http(rpc_url.clone());

        info!(
            rpc_url = %rpc_url,
            presale = %addresses.presale,
            payment_token = %addresses.payment_token,
            reward_token = %addresses.reward_token,
            airdrop = %addresses.airdrop,
            "Created live ledger"
        );

        Ok(Self {
            rpc_url,
            provider,
            addresses,
        })
    }

    pub fn addresses(&self) -> &LedgerAddresses {
        &self.addresses
    }

    /// Chain id served by the RPC endpoint
    pub async fn chain_id(&self) -> ClientResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ClientError::Read(format!("chain id: {}", e)))
    }

    fn token_address(&self, token: TokenKind) -> Option<Address> {
        match token {
            TokenKind::Native => None,
            TokenKind::Payment => Some(self.addresses.payment_token),
            TokenKind::Reward => Some(self.addresses.reward_token),
        }
    }

    /// Wrap a submitted transaction's receipt future
    fn track<F>(tx_hash: B256, label: &'static str, receipt: F) -> PendingTx
    where
        F: Future<Output = std::result::Result<TransactionReceipt, String>> + Send + 'static,
    {
        info!(tx_hash = %tx_hash, label, "Transaction submitted");

        let confirmation = async move {
            let receipt = receipt
                .await
                .map_err(|e| ClientError::Revert(format!("Failed to get {} receipt: {}", label, e)))?;
            let summary = summarize(&receipt);
            if summary.success {
                info!(tx_hash = %summary.tx_hash, block = ?summary.block_number, label, "Transaction confirmed");
            } else {
                warn!(tx_hash = %summary.tx_hash, label, "Transaction reverted");
            }
            Ok(summary)
        }
        .boxed();

        PendingTx::new(tx_hash, confirmation)
    }
}

#[async_trait]
impl LedgerSource for LiveLedger {
    fn label(&self) -> &'static str {
        "live"
    }

    fn origin(&self) -> DataOrigin {
        DataOrigin::Live
    }

    async fn presale_totals(&self) -> ClientResult<PresaleTotals> {
        let presale = Presale::new(self.addresses.presale, &self.provider);

        let total_raised = presale.totalRaised().call().await.map_err(read_err("totalRaised"))?._0;
        let hard_cap = presale.hardCap().call().await.map_err(read_err("hardCap"))?._0;
        let rate = presale.rate().call().await.map_err(read_err("rate"))?._0;

        Ok(PresaleTotals {
            total_raised,
            hard_cap,
            rate,
        })
    }

    async fn contribution(&self, account: Address) -> ClientResult<U256> {
        let presale = Presale::new(self.addresses.presale, &self.provider);
        Ok(presale
            .contributions(account)
            .call()
            .await
            .map_err(read_err("contributions"))?
            ._0)
    }

    async fn balance(&self, token: TokenKind, account: Address) -> ClientResult<U256> {
        match self.token_address(token) {
            None => self
                .provider
                .get_balance(account)
                .await
                .map_err(|e| ClientError::Read(format!("native balance: {}", e))),
            Some(address) => {
                let erc20 = ERC20::new(address, &self.provider);
                Ok(erc20
                    .balanceOf(account)
                    .call()
                    .await
                    .map_err(read_err("balanceOf"))?
                    ._0)
            }
        }
    }

    async fn payment_allowance(&self, owner: Address) -> ClientResult<U256> {
        let erc20 = ERC20::new(self.addresses.payment_token, &self.provider);
        Ok(erc20
            .allowance(owner, self.addresses.presale)
            .call()
            .await
            .map_err(read_err("allowance"))?
            ._0)
    }

    async fn is_eligible(&self, account: Address) -> ClientResult<bool> {
        let airdrop = Airdrop::new(self.addresses.airdrop, &self.provider);
        Ok(airdrop
            .isEligible(account)
            .call()
            .await
            .map_err(read_err("isEligible"))?
            ._0)
    }

    async fn has_claimed(&self, account: Address) -> ClientResult<bool> {
        let airdrop = Airdrop::new(self.addresses.airdrop, &self.provider);
        Ok(airdrop
            .hasClaimed(account)
            .call()
            .await
            .map_err(read_err("hasClaimed"))?
            ._0)
    }

    async fn airdrop_amount(&self) -> ClientResult<U256> {
        let airdrop = Airdrop::new(self.addresses.airdrop, &self.provider);
        Ok(airdrop
            .AIRDROP_AMOUNT()
            .call()
            .await
            .map_err(read_err("AIRDROP_AMOUNT"))?
            ._0)
    }

    async fn latest_block(&self) -> ClientResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ClientError::Read(format!("block number: {}", e)))
    }

    async fn reward_transfers(
        &self,
        direction: TransferDirection,
        account: Address,
        from_block: u64,
        to_block: u64,
    ) -> ClientResult<Vec<TransferLog>> {
        let base = Filter::new()
            .address(self.addresses.reward_token)
            .event_signature(ERC20::Transfer::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let filter = match direction {
            TransferDirection::Incoming => base.topic2(account.into_word()),
            TransferDirection::Outgoing => base.topic1(account.into_word()),
        };

        let logs = self.provider.get_logs(&filter).await.map_err(|e| {
            ClientError::Read(format!(
                "Failed to get logs from block {} to {}: {}",
                from_block, to_block, e
            ))
        })?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs {
            let (Some(block_number), Some(tx_hash)) = (log.block_number, log.transaction_hash) else {
                // Pending logs carry no position yet
                continue;
            };
            let log_index = log.log_index.unwrap_or_default();
            match log.log_decode::<ERC20::Transfer>() {
                Ok(decoded) => {
                    let event = decoded.inner.data;
                    transfers.push(TransferLog {
                        from: event.from,
                        to: event.to,
                        value: event.value,
                        block_number,
                        tx_hash,
                        log_index,
                    });
                }
                Err(e) => warn!(tx_hash = %tx_hash, error = %e, "Undecodable Transfer log"),
            }
        }

        debug!(
            ?direction,
            count = transfers.len(),
            from = from_block,
            to = to_block,
            "Fetched reward transfers"
        );
        Ok(transfers)
    }

    async fn block_timestamp(&self, block_number: u64) -> ClientResult<u64> {
        let block = self
            .provider
            .get_block_by_number(
                BlockNumberOrTag::Number(block_number),
                BlockTransactionsKind::Hashes,
            )
            .await
            .map_err(|e| ClientError::Read(format!("block {}: {}", block_number, e)))?
            .ok_or_else(|| ClientError::Read(format!("block {} not found", block_number)))?;
        Ok(block.header.timestamp)
    }

    async fn approve_payment(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.clone());
        let erc20 = ERC20::new(self.addresses.payment_token, &provider);

        let pending = erc20
            .approve(self.addresses.presale, amount)
            .send()
            .await
            .map_err(write_err)?;
        let tx_hash = *pending.tx_hash();
        Ok(Self::track(tx_hash, "approve", async move {
            pending.get_receipt().await.map_err(|e| e.to_string())
        }))
    }

    async fn buy_tokens(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.clone());
        let presale = Presale::new(self.addresses.presale, &provider);

        let pending = presale.buyTokens(amount).send().await.map_err(write_err)?;
        let tx_hash = *pending.tx_hash();
        Ok(Self::track(tx_hash, "buyTokens", async move {
            pending.get_receipt().await.map_err(|e| e.to_string())
        }))
    }

    async fn claim_airdrop(&self, wallet: &EthereumWallet) -> ClientResult<PendingTx> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.clone())
            .on_http(self.rpc_url.clone());
        let airdrop = Airdrop::new(self.addresses.airdrop, &provider);

        let pending = airdrop.claim().send().await.map_err(write_err)?;
        let tx_hash = *pending.tx_hash();
        Ok(Self::track(tx_hash, "claim", async move {
            pending.get_receipt().await.map_err(|e| e.to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> LedgerAddresses {
        LedgerAddresses {
            presale: Address::repeat_byte(0x01),
            payment_token: Address::repeat_byte(0x02),
            reward_token: Address::repeat_byte(0x03),
            airdrop: Address::repeat_byte(0x04),
        }
    }

    #[test]
    fn test_rejects_invalid_rpc_url() {
        assert!(LiveLedger::new("not a url", addresses()).is_err());
    }

    #[test]
    fn test_token_addresses() {
        let ledger = LiveLedger::new("http://localhost:8545", addresses()).unwrap();
        assert_eq!(ledger.token_address(TokenKind::Native), None);
        assert_eq!(ledger.token_address(TokenKind::Payment), Some(Address::repeat_byte(0x02)));
        assert_eq!(ledger.token_address(TokenKind::Reward), Some(Address::repeat_byte(0x03)));
        assert_eq!(ledger.label(), "live");
        assert_eq!(ledger.origin(), DataOrigin::Live);
    }

    /// Requires a node at localhost:8545
    #[tokio::test]
    #[ignore]
    async fn test_reads_block_number() {
        let ledger = LiveLedger::new("http://localhost:8545", addresses()).unwrap();
        let block = ledger.latest_block().await.unwrap();
        let ts = ledger.block_timestamp(block).await.unwrap();
        assert!(ts > 0);
    }
}
