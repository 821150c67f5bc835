//! Synthetic ledger
//!
//! In-memory stand-in for the deployed contracts. Every account starts with
//! the demo balances below; approve, buy and claim mutate the state the way
//! the contracts would, and mint Transfer logs so activity history works.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use alloy::network::{Ethereum, EthereumWallet, NetworkWallet};
use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info};

use super::{
    LedgerSource, PendingTx, PresaleTotals, TokenKind, TransferDirection, TransferLog, TxReceipt,
};
use crate::error::{ClientError, ClientResult};
use crate::fetch::DataOrigin;
use crate::units::reward_for_payment;

/// 6,500 USDC
pub const DEMO_TOTAL_RAISED: U256 = U256::from_limbs([6_500_000_000, 0, 0, 0]);
/// 10,000 USDC
pub const DEMO_HARD_CAP: U256 = U256::from_limbs([10_000_000_000, 0, 0, 0]);
/// CHRONO per USDC
pub const DEMO_RATE: U256 = U256::from_limbs([100, 0, 0, 0]);
/// 500.75 USDC
pub const DEMO_PAYMENT_BALANCE: U256 = U256::from_limbs([500_750_000, 0, 0, 0]);
/// 1,250 CHRONO
pub const DEMO_REWARD_BALANCE: U256 = U256::from_limbs([14_068_147_061_460_041_728, 67, 0, 0]);
/// 12.56 TEMPO
pub const DEMO_NATIVE_BALANCE: U256 = U256::from_limbs([12_560_000_000_000_000_000, 0, 0, 0]);
/// 1,250 CHRONO
pub const DEMO_AIRDROP_AMOUNT: U256 = DEMO_REWARD_BALANCE;

/// Contract addresses the synthetic ledger reports as senders
const PRESALE_ADDRESS: Address = Address::repeat_byte(0xc1);
const AIRDROP_ADDRESS: Address = Address::repeat_byte(0xa1);

const GENESIS_BLOCK: u64 = 5_000;
/// 2026-01-01T00:00:00Z
const GENESIS_TIMESTAMP: u64 = 1_767_225_600;
const BLOCK_TIME_SECS: u64 = 2;

struct FixtureState {
    totals: PresaleTotals,
    balances: HashMap<(TokenKind, Address), U256>,
    allowances: HashMap<Address, U256>,
    contributions: HashMap<Address, U256>,
    ineligible: HashSet<Address>,
    default_eligible: bool,
    claimed: HashSet<Address>,
    airdrop_amount: U256,
    block: u64,
    nonce: u64,
    transfers: Vec<TransferLog>,
}

impl FixtureState {
    fn balance(&mut self, token: TokenKind, account: Address) -> &mut U256 {
        self.balances
            .entry((token, account))
            .or_insert_with(|| demo_balance(token))
    }

    /// Mine one block holding a single reward-token transfer
    fn mint_reward(&mut self, from: Address, to: Address, value: U256, label: &str) -> TxReceipt {
        self.block += 1;
        let tx_hash = self.next_hash(label);
        *self.balance(TokenKind::Reward, to) += value;
        self.transfers.push(TransferLog {
            from,
            to,
            value,
            block_number: self.block,
            tx_hash,
            log_index: 0,
        });
        TxReceipt {
            tx_hash,
            block_number: Some(self.block),
            success: true,
        }
    }

    /// Mine one block without logs
    fn mine(&mut self, label: &str, success: bool) -> TxReceipt {
        self.block += 1;
        TxReceipt {
            tx_hash: self.next_hash(label),
            block_number: Some(self.block),
            success,
        }
    }

    fn next_hash(&mut self, label: &str) -> B256 {
        self.nonce += 1;
        keccak256(format!("chronomint:{}:{}", label, self.nonce))
    }
}

fn demo_balance(token: TokenKind) -> U256 {
    match token {
        TokenKind::Native => DEMO_NATIVE_BALANCE,
        TokenKind::Payment => DEMO_PAYMENT_BALANCE,
        TokenKind::Reward => DEMO_REWARD_BALANCE,
    }
}

pub struct SyntheticLedger {
    state: Mutex<FixtureState>,
    fail_reads: AtomicBool,
    reject_writes: AtomicBool,
    revert_writes: AtomicBool,
    reads: AtomicU64,
}

impl Default for SyntheticLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FixtureState {
                totals: PresaleTotals {
                    total_raised: DEMO_TOTAL_RAISED,
                    hard_cap: DEMO_HARD_CAP,
                    rate: DEMO_RATE,
                },
                balances: HashMap::new(),
                allowances: HashMap::new(),
                contributions: HashMap::new(),
                ineligible: HashSet::new(),
                default_eligible: true,
                claimed: HashSet::new(),
                airdrop_amount: DEMO_AIRDROP_AMOUNT,
                block: GENESIS_BLOCK,
                nonce: 0,
                transfers: Vec::new(),
            }),
            fail_reads: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            revert_writes: AtomicBool::new(false),
            reads: AtomicU64::new(0),
        }
    }

    /// Whether accounts are eligible unless marked otherwise
    pub fn with_eligibility(self, eligible: bool) -> Self {
        self.lock().default_eligible = eligible;
        self
    }

    pub fn with_allowance(self, owner: Address, amount: U256) -> Self {
        self.lock().allowances.insert(owner, amount);
        self
    }

    pub fn with_balance(self, token: TokenKind, account: Address, amount: U256) -> Self {
        self.lock().balances.insert((token, account), amount);
        self
    }

    pub fn set_eligible(&self, account: Address, eligible: bool) {
        let mut state = self.lock();
        if eligible {
            state.ineligible.remove(&account);
        } else {
            state.ineligible.insert(account);
        }
    }

    pub fn mark_claimed(&self, account: Address) {
        self.lock().claimed.insert(account);
    }

    /// Make every read fail, as if the RPC were down
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make the wallet reject every write request
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Accept writes but revert them on-chain
    pub fn set_revert_writes(&self, revert: bool) {
        self.revert_writes.store(revert, Ordering::SeqCst);
    }

    /// Number of read calls served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Move an account's reward tokens elsewhere, producing an outgoing log
    pub fn transfer_reward(&self, from: Address, to: Address, value: U256) -> B256 {
        let mut state = self.lock();
        let balance = state.balance(TokenKind::Reward, from);
        *balance = balance.saturating_sub(value);
        state.mint_reward(from, to, value, "transfer").tx_hash
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, what: &str) -> ClientResult<MutexGuard<'_, FixtureState>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::Read(format!("{}: synthetic RPC unavailable", what)));
        }
        Ok(self.lock())
    }

    /// Common write gate: wallet rejection, then on-chain revert
    fn write(&self, wallet: &EthereumWallet, label: &'static str) -> ClientResult<Option<Address>> {
        if self.reject_writes.load(Ordering::SeqCst) {
            info!(label, "Synthetic wallet rejected the request");
            return Err(ClientError::UserRejected);
        }
        let sender = <EthereumWallet as NetworkWallet<Ethereum>>::default_signer_address(wallet);
        if self.revert_writes.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(sender))
    }

    fn submitted(receipt: TxReceipt, label: &'static str) -> PendingTx {
        debug!(tx_hash = %receipt.tx_hash, label, success = receipt.success, "Synthetic transaction mined");
        let tx_hash = receipt.tx_hash;
        PendingTx::new(tx_hash, async move { Ok(receipt) }.boxed())
    }
}

#[async_trait]
impl LedgerSource for SyntheticLedger {
    fn label(&self) -> &'static str {
        "synthetic"
    }

    fn origin(&self) -> DataOrigin {
        DataOrigin::Synthetic
    }

    async fn presale_totals(&self) -> ClientResult<PresaleTotals> {
        Ok(self.read("presale totals")?.totals.clone())
    }

    async fn contribution(&self, account: Address) -> ClientResult<U256> {
        Ok(self
            .read("contributions")?
            .contributions
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn balance(&self, token: TokenKind, account: Address) -> ClientResult<U256> {
        Ok(*self.read("balance")?.balance(token, account))
    }

    async fn payment_allowance(&self, owner: Address) -> ClientResult<U256> {
        Ok(self
            .read("allowance")?
            .allowances
            .get(&owner)
            .copied()
            .unwrap_or_default())
    }

    async fn is_eligible(&self, account: Address) -> ClientResult<bool> {
        let state = self.read("isEligible")?;
        Ok(state.default_eligible && !state.ineligible.contains(&account))
    }

    async fn has_claimed(&self, account: Address) -> ClientResult<bool> {
        Ok(self.read("hasClaimed")?.claimed.contains(&account))
    }

    async fn airdrop_amount(&self) -> ClientResult<U256> {
        Ok(self.read("AIRDROP_AMOUNT")?.airdrop_amount)
    }

    async fn latest_block(&self) -> ClientResult<u64> {
        Ok(self.read("block number")?.block)
    }

    async fn reward_transfers(
        &self,
        direction: TransferDirection,
        account: Address,
        from_block: u64,
        to_block: u64,
    ) -> ClientResult<Vec<TransferLog>> {
        let state = self.read("logs")?;
        Ok(state
            .transfers
            .iter()
            .filter(|t| (from_block..=to_block).contains(&t.block_number))
            .filter(|t| match direction {
                TransferDirection::Incoming => t.to == account,
                TransferDirection::Outgoing => t.from == account,
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_number: u64) -> ClientResult<u64> {
        let state = self.read("block")?;
        if block_number > state.block {
            return Err(ClientError::Read(format!("block {} not found", block_number)));
        }
        Ok(GENESIS_TIMESTAMP + block_number.saturating_sub(GENESIS_BLOCK) * BLOCK_TIME_SECS)
    }

    async fn approve_payment(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx> {
        let sender = self.write(wallet, "approve")?;
        let mut state = self.lock();
        let receipt = match sender {
            Some(owner) => {
                state.allowances.insert(owner, amount);
                state.mine("approve", true)
            }
            None => state.mine("approve", false),
        };
        Ok(Self::submitted(receipt, "approve"))
    }

    async fn buy_tokens(&self, wallet: &EthereumWallet, amount: U256) -> ClientResult<PendingTx> {
        let sender = self.write(wallet, "buyTokens")?;
        let mut state = self.lock();
        let Some(buyer) = sender else {
            return Ok(Self::submitted(state.mine("buyTokens", false), "buyTokens"));
        };

        let allowance = state.allowances.get(&buyer).copied().unwrap_or_default();
        let balance = *state.balance(TokenKind::Payment, buyer);
        let remaining = state.totals.hard_cap.saturating_sub(state.totals.total_raised);
        if amount.is_zero() || allowance < amount || balance < amount || amount > remaining {
            return Ok(Self::submitted(state.mine("buyTokens", false), "buyTokens"));
        }

        state.allowances.insert(buyer, allowance - amount);
        *state.balance(TokenKind::Payment, buyer) -= amount;
        state.totals.total_raised += amount;
        *state.contributions.entry(buyer).or_default() += amount;

        let reward = reward_for_payment(amount, state.totals.rate);
        let receipt = state.mint_reward(PRESALE_ADDRESS, buyer, reward, "buyTokens");
        Ok(Self::submitted(receipt, "buyTokens"))
    }

    async fn claim_airdrop(&self, wallet: &EthereumWallet) -> ClientResult<PendingTx> {
        let sender = self.write(wallet, "claim")?;
        let mut state = self.lock();
        let Some(claimer) = sender else {
            return Ok(Self::submitted(state.mine("claim", false), "claim"));
        };

        let eligible = state.default_eligible && !state.ineligible.contains(&claimer);
        if !eligible || state.claimed.contains(&claimer) {
            return Ok(Self::submitted(state.mine("claim", false), "claim"));
        }

        state.claimed.insert(claimer);
        let amount = state.airdrop_amount;
        let receipt = state.mint_reward(AIRDROP_ADDRESS, claimer, amount, "claim");
        Ok(Self::submitted(receipt, "claim"))
    }
}
