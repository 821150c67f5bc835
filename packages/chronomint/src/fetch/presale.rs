//! Presale state fetcher

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::{DataOrigin, Fetch, Fetched};
use crate::ledger::fixture::{DEMO_HARD_CAP, DEMO_PAYMENT_BALANCE, DEMO_RATE, DEMO_TOTAL_RAISED};
use crate::ledger::{LedgerSource, PresaleTotals, TokenKind};
use crate::units::{
    format_display, format_progress, parse_units_or_zero, progress_basis_points,
    reward_for_payment, PAYMENT_DECIMALS, REWARD_DECIMALS,
};

/// Presale totals plus the connected account's USDC position, in base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresaleState {
    pub total_raised: U256,
    pub hard_cap: U256,
    /// CHRONO per whole USDC
    pub rate: U256,
    pub user_balance: U256,
    pub user_allowance: U256,
    pub contribution: U256,
    pub origin: DataOrigin,
}

impl Default for PresaleState {
    fn default() -> Self {
        Self::initial()
    }
}

impl PresaleState {
    /// Value shown before the first fetch completes
    pub fn initial() -> Self {
        Self {
            total_raised: U256::ZERO,
            hard_cap: DEMO_HARD_CAP,
            rate: DEMO_RATE,
            user_balance: U256::ZERO,
            user_allowance: U256::ZERO,
            contribution: U256::ZERO,
            origin: DataOrigin::Synthetic,
        }
    }

    /// Demo values substituted when the ledger cannot be read
    pub fn fallback(account: Option<Address>) -> Self {
        Self {
            total_raised: DEMO_TOTAL_RAISED,
            hard_cap: DEMO_HARD_CAP,
            rate: DEMO_RATE,
            user_balance: if account.is_some() {
                DEMO_PAYMENT_BALANCE
            } else {
                U256::ZERO
            },
            user_allowance: U256::ZERO,
            contribution: U256::ZERO,
            origin: DataOrigin::Synthetic,
        }
    }

    pub fn progress_basis_points(&self) -> u64 {
        progress_basis_points(self.total_raised, self.hard_cap)
    }

    /// e.g. `"65.0%"`
    pub fn progress_label(&self) -> String {
        format_progress(self.total_raised, self.hard_cap)
    }

    /// CHRONO base units the entered USDC amount buys; zero if unparseable
    pub fn estimated_reward(&self, amount: &str) -> U256 {
        reward_for_payment(parse_units_or_zero(amount, PAYMENT_DECIMALS), self.rate)
    }

    pub fn estimated_reward_display(&self, amount: &str) -> String {
        format_display(self.estimated_reward(amount), REWARD_DECIMALS, 2)
    }

    pub fn raised_display(&self) -> String {
        format_display(self.total_raised, PAYMENT_DECIMALS, 2)
    }

    pub fn hard_cap_display(&self) -> String {
        format_display(self.hard_cap, PAYMENT_DECIMALS, 2)
    }

    pub fn balance_display(&self) -> String {
        format_display(self.user_balance, PAYMENT_DECIMALS, 2)
    }

    /// Optimistic local update after a confirmed purchase of `cost`
    pub fn apply_purchase(&mut self, cost: U256) {
        self.total_raised = self.total_raised.saturating_add(cost);
        self.user_balance = self.user_balance.saturating_sub(cost);
        self.user_allowance = self.user_allowance.saturating_sub(cost);
        self.contribution = self.contribution.saturating_add(cost);
    }
}

pub struct PresaleFetcher {
    ledger: Arc<dyn LedgerSource>,
}

impl PresaleFetcher {
    pub fn new(ledger: Arc<dyn LedgerSource>) -> Self {
        Self { ledger }
    }

    async fn totals(&self) -> Option<PresaleTotals> {
        match self.ledger.presale_totals().await {
            Ok(totals) => Some(totals),
            Err(e) => {
                warn!(error = %e, "Error fetching presale data, using demo totals");
                None
            }
        }
    }
}

#[async_trait]
impl Fetch for PresaleFetcher {
    type Output = PresaleState;
    const NAME: &'static str = "presale";

    async fn fetch(&self, account: Option<Address>) -> Fetched<PresaleState> {
        let mut state = PresaleState::fallback(account);
        let mut fallback = false;

        match self.totals().await {
            Some(totals) => {
                state.total_raised = totals.total_raised;
                state.hard_cap = totals.hard_cap;
                state.rate = totals.rate;
            }
            None => fallback = true,
        }

        if let Some(account) = account {
            match self.ledger.balance(TokenKind::Payment, account).await {
                Ok(balance) => state.user_balance = balance,
                Err(e) => {
                    warn!(account = %account, error = %e, "USDC balance read failed, using demo balance");
                    fallback = true;
                }
            }
            match self.ledger.payment_allowance(account).await {
                Ok(allowance) => state.user_allowance = allowance,
                Err(e) => {
                    warn!(account = %account, error = %e, "Allowance read failed");
                    fallback = true;
                }
            }
            match self.ledger.contribution(account).await {
                Ok(contribution) => state.contribution = contribution,
                Err(e) => {
                    warn!(account = %account, error = %e, "Contribution read failed");
                    fallback = true;
                }
            }
        }

        state.origin = if fallback {
            DataOrigin::Synthetic
        } else {
            self.ledger.origin()
        };

        Fetched { value: state, fallback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SyntheticLedger;
    use crate::units::parse_units;

    fn usdc(amount: &str) -> U256 {
        parse_units(amount, PAYMENT_DECIMALS).unwrap()
    }

    #[test]
    fn test_progress_label() {
        let state = PresaleState {
            total_raised: usdc("6500"),
            hard_cap: usdc("10000"),
            ..PresaleState::initial()
        };
        assert_eq!(state.progress_label(), "65.0%");

        let zero_cap = PresaleState {
            hard_cap: U256::ZERO,
            ..state.clone()
        };
        assert_eq!(zero_cap.progress_label(), "0.0%");

        let over = PresaleState {
            total_raised: usdc("12000"),
            ..state
        };
        assert_eq!(over.progress_label(), "100.0%");
    }

    #[test]
    fn test_estimated_reward() {
        let state = PresaleState::initial();
        assert_eq!(state.estimated_reward_display("2.5"), "250.00");
        assert_eq!(state.estimated_reward("abc"), U256::ZERO);
    }

    #[test]
    fn test_apply_purchase() {
        let mut state = PresaleState {
            total_raised: usdc("6500"),
            user_balance: usdc("500"),
            user_allowance: usdc("100"),
            ..PresaleState::initial()
        };
        state.apply_purchase(usdc("100"));
        assert_eq!(state.total_raised, usdc("6600"));
        assert_eq!(state.user_balance, usdc("400"));
        assert_eq!(state.user_allowance, U256::ZERO);
        assert_eq!(state.contribution, usdc("100"));
    }

    #[tokio::test]
    async fn test_fetch_reads_account_position() {
        let account = Address::repeat_byte(7);
        let ledger = Arc::new(SyntheticLedger::new().with_allowance(account, usdc("50")));
        let fetcher = PresaleFetcher::new(ledger);

        let fetched = fetcher.fetch(Some(account)).await;
        assert!(!fetched.fallback);
        assert_eq!(fetched.value.total_raised, usdc("6500"));
        assert_eq!(fetched.value.user_balance, usdc("500.75"));
        assert_eq!(fetched.value.user_allowance, usdc("50"));
        assert_eq!(fetched.value.origin, DataOrigin::Synthetic);
    }

    #[tokio::test]
    async fn test_read_failure_uses_fallback() {
        let ledger = Arc::new(SyntheticLedger::new());
        ledger.set_fail_reads(true);
        let fetcher = PresaleFetcher::new(ledger);

        let fetched = fetcher.fetch(Some(Address::repeat_byte(7))).await;
        assert!(fetched.fallback);
        assert_eq!(fetched.value, PresaleState::fallback(Some(Address::repeat_byte(7))));
        assert_eq!(fetched.value.progress_label(), "65.0%");
    }

    #[tokio::test]
    async fn test_repeated_fetch_is_idempotent() {
        let fetcher = PresaleFetcher::new(Arc::new(SyntheticLedger::new()));
        let account = Some(Address::repeat_byte(3));
        let first = fetcher.fetch(account).await;
        let second = fetcher.fetch(account).await;
        assert_eq!(first, second);
    }
}
