//! Presale purchase flow
//!
//! `idle -> approving -> approved -> buying -> done`, with `error` reachable
//! from either submitting phase. Every submission reports progress on the
//! status channel and ends with a terminal message.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::StatusMessage;
use crate::bus::RefreshAction;
use crate::error::{ClientError, ClientResult};
use crate::fetch::{PresaleState, RefreshTrigger, Store};
use crate::ledger::{LedgerSource, TokenKind, TxReceipt};
use crate::metrics::Metrics;
use crate::session::SessionManager;
use crate::units::{format_units, parse_units, parse_units_or_zero, PAYMENT_DECIMALS};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchasePhase {
    #[default]
    Idle,
    Approving,
    Approved,
    Buying,
    Done,
    Error,
}

impl PurchasePhase {
    pub fn is_busy(self) -> bool {
        matches!(self, PurchasePhase::Approving | PurchasePhase::Buying)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    ConnectWallet,
    Processing,
    Approve,
    Buy,
}

impl PrimaryAction {
    pub fn label(self) -> &'static str {
        match self {
            PrimaryAction::ConnectWallet => "Connect Wallet",
            PrimaryAction::Processing => "Processing...",
            PrimaryAction::Approve => "Approve USDC",
            PrimaryAction::Buy => "Buy CHRONO",
        }
    }
}

/// Approval is needed when connected, the amount is positive and the
/// allowance does not cover it. Unparseable input counts as zero.
pub fn needs_approval(account: Option<Address>, allowance: U256, amount: &str) -> bool {
    let requested = parse_units_or_zero(amount, PAYMENT_DECIMALS);
    account.is_some() && !requested.is_zero() && allowance < requested
}

pub struct PurchaseFlow {
    session: Arc<SessionManager>,
    ledger: Arc<dyn LedgerSource>,
    presale: Store<PresaleState>,
    refresh: Option<RefreshTrigger>,
    status: mpsc::UnboundedSender<StatusMessage>,
    metrics: Option<Arc<Metrics>>,
    settle_delay: Duration,
    amount: String,
    phase: PurchasePhase,
}

impl PurchaseFlow {
    pub fn new(
        session: Arc<SessionManager>,
        ledger: Arc<dyn LedgerSource>,
        presale: Store<PresaleState>,
        status: mpsc::UnboundedSender<StatusMessage>,
    ) -> Self {
        Self {
            session,
            ledger,
            presale,
            refresh: None,
            status,
            metrics: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
            amount: String::new(),
            phase: PurchasePhase::Idle,
        }
    }

    /// Presale poller to re-run after a purchase settles
    pub fn with_refresh(mut self, trigger: RefreshTrigger, settle_delay: Duration) -> Self {
        self.refresh = Some(trigger);
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn set_amount(&mut self, amount: impl Into<String>) {
        self.amount = amount.into();
        if matches!(self.phase, PurchasePhase::Done | PurchasePhase::Error) {
            self.phase = PurchasePhase::Idle;
        }
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn phase(&self) -> PurchasePhase {
        self.phase
    }

    pub fn needs_approval(&self) -> bool {
        let allowance = self.presale.borrow().user_allowance;
        needs_approval(self.session.account(), allowance, &self.amount)
    }

    pub fn primary_action(&self) -> PrimaryAction {
        if self.session.account().is_none() {
            PrimaryAction::ConnectWallet
        } else if self.phase.is_busy() {
            PrimaryAction::Processing
        } else if self.needs_approval() {
            PrimaryAction::Approve
        } else {
            PrimaryAction::Buy
        }
    }

    /// CHRONO the entered amount buys at the current rate
    pub fn estimated_reward(&self) -> U256 {
        self.presale.borrow().estimated_reward(&self.amount)
    }

    /// Primary button: connect, approve or buy depending on state.
    /// Returns `None` when it only prompted for a connection.
    pub async fn submit(&mut self) -> ClientResult<Option<TxReceipt>> {
        match self.primary_action() {
            PrimaryAction::ConnectWallet => {
                self.session.connect().await;
                Ok(None)
            }
            PrimaryAction::Processing => Err(ClientError::InvalidStep("a transaction is pending")),
            PrimaryAction::Approve => self.approve().await.map(Some),
            PrimaryAction::Buy => self.buy().await.map(Some),
        }
    }

    /// Approve the presale contract for exactly the entered amount
    pub async fn approve(&mut self) -> ClientResult<TxReceipt> {
        let (account, amount) = self.prepare()?;
        let previous = self.phase;

        self.phase = PurchasePhase::Approving;
        self.emit(StatusMessage::info("Requesting approval..."));

        let result = self.submit_approval(account, amount).await;
        match &result {
            Ok(receipt) => {
                self.phase = PurchasePhase::Approved;
                self.record("approve", "confirmed");
                info!(tx_hash = %receipt.tx_hash, amount = %amount, "Approval confirmed");
                self.emit(StatusMessage::success(
                    "Approval confirmed! You can now buy tokens.",
                ));
            }
            Err(e) => {
                self.phase = self.failed_phase(e, previous);
                self.record("approve", outcome(e));
                warn!(error = %e, "Approval failed");
                self.emit(StatusMessage::error(format!("Approval failed: {}", e)));
            }
        }
        result
    }

    async fn submit_approval(&self, account: Address, amount: U256) -> ClientResult<TxReceipt> {
        let wallet = self.session.signer()?;
        let pending = self.ledger.approve_payment(&wallet, amount).await?;
        self.emit(StatusMessage::info(
            "Approval sent. Waiting for confirmation...",
        ));
        let receipt = pending.confirmed().await?;

        match self.ledger.payment_allowance(account).await {
            Ok(allowance) => {
                self.presale.send_if_modified(|state| {
                    let changed = state.user_allowance != allowance;
                    state.user_allowance = allowance;
                    changed
                });
            }
            Err(e) => warn!(error = %e, "Allowance re-read failed after approval"),
        }
        Ok(receipt)
    }

    /// Buy CHRONO with the entered amount after re-checking balance and allowance
    pub async fn buy(&mut self) -> ClientResult<TxReceipt> {
        let (account, amount) = self.prepare()?;
        let previous = self.phase;

        self.phase = PurchasePhase::Buying;
        let result = self.submit_purchase(account, amount).await;
        match &result {
            Ok(receipt) => {
                self.phase = PurchasePhase::Done;
                self.record("buy", "confirmed");
                info!(tx_hash = %receipt.tx_hash, amount = %amount, "Purchase confirmed");
                self.emit(StatusMessage::success(
                    "Success! CHRONO tokens allocated to your wallet.",
                ));

                self.amount.clear();
                self.presale.send_modify(|state| state.apply_purchase(amount));
                if let Some(refresh) = &self.refresh {
                    refresh.after(self.settle_delay);
                }
                self.session.refresh_data(RefreshAction::Purchase);
            }
            Err(e) => {
                self.phase = self.failed_phase(e, previous);
                self.record("buy", outcome(e));
                warn!(error = %e, "Purchase failed");
                self.emit(StatusMessage::error(format!("Failed: {}", e)));
            }
        }
        result
    }

    async fn submit_purchase(&self, account: Address, amount: U256) -> ClientResult<TxReceipt> {
        let cached = self.presale.borrow().clone();
        let balance = match self.ledger.balance(TokenKind::Payment, account).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Balance re-read failed, using last known value");
                cached.user_balance
            }
        };
        let allowance = match self.ledger.payment_allowance(account).await {
            Ok(allowance) => allowance,
            Err(e) => {
                warn!(error = %e, "Allowance re-read failed, using last known value");
                cached.user_allowance
            }
        };

        if balance < amount {
            return Err(ClientError::InsufficientBalance {
                available: format_units(balance, PAYMENT_DECIMALS),
                required: self.amount.trim().to_string(),
            });
        }
        if allowance < amount {
            return Err(ClientError::InsufficientAllowance);
        }

        let wallet = self.session.signer()?;
        self.emit(StatusMessage::info("Please confirm in wallet..."));
        let pending = self.ledger.buy_tokens(&wallet, amount).await?;
        self.emit(StatusMessage::info(
            "Transaction sent. Waiting for confirmation...",
        ));
        pending.confirmed().await
    }

    fn prepare(&self) -> ClientResult<(Address, U256)> {
        if self.phase.is_busy() {
            return Err(ClientError::InvalidStep("a transaction is pending"));
        }
        let account = self.session.account().ok_or(ClientError::NotConnected)?;
        let amount = parse_units(&self.amount, PAYMENT_DECIMALS)?;
        if amount.is_zero() {
            return Err(ClientError::ZeroAmount);
        }
        Ok((account, amount))
    }

    /// A rejection in the wallet restores the pre-action phase
    fn failed_phase(&self, error: &ClientError, previous: PurchasePhase) -> PurchasePhase {
        if error.is_user_rejected() {
            previous
        } else {
            PurchasePhase::Error
        }
    }

    fn emit(&self, message: StatusMessage) {
        // Nobody listening is fine
        let _ = self.status.send(message);
    }

    fn record(&self, action: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_transaction(action, outcome);
        }
    }
}

fn outcome(error: &ClientError) -> &'static str {
    if error.is_user_rejected() {
        "rejected"
    } else {
        error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc(amount: &str) -> U256 {
        parse_units(amount, PAYMENT_DECIMALS).unwrap()
    }

    #[test]
    fn test_needs_approval() {
        let account = Some(Address::repeat_byte(1));

        assert!(needs_approval(account, U256::ZERO, "10"));
        assert!(needs_approval(account, usdc("9.999999"), "10"));
        assert!(!needs_approval(account, usdc("10"), "10"));
        assert!(!needs_approval(account, usdc("25"), "10"));

        // No account, zero or garbage input never needs approval
        assert!(!needs_approval(None, U256::ZERO, "10"));
        assert!(!needs_approval(account, U256::ZERO, "0"));
        assert!(!needs_approval(account, U256::ZERO, ""));
        assert!(!needs_approval(account, U256::ZERO, "ten"));
        assert!(!needs_approval(account, U256::ZERO, "1.0000001"));
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(PrimaryAction::ConnectWallet.label(), "Connect Wallet");
        assert_eq!(PrimaryAction::Approve.label(), "Approve USDC");
        assert_eq!(PrimaryAction::Buy.label(), "Buy CHRONO");
        assert_eq!(PrimaryAction::Processing.label(), "Processing...");
    }

    #[test]
    fn test_busy_phases() {
        assert!(PurchasePhase::Approving.is_busy());
        assert!(PurchasePhase::Buying.is_busy());
        assert!(!PurchasePhase::Error.is_busy());
        assert!(!PurchasePhase::Approved.is_busy());
    }
}
