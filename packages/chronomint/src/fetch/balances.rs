//! Dashboard balance fetcher

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::{DataOrigin, Fetch, Fetched};
use crate::ledger::fixture::{DEMO_NATIVE_BALANCE, DEMO_PAYMENT_BALANCE, DEMO_REWARD_BALANCE};
use crate::ledger::{LedgerSource, TokenKind};
use crate::units::{format_display, format_units};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardBalances {
    pub native: U256,
    pub reward: U256,
    pub payment: U256,
    pub origin: DataOrigin,
}

impl DashboardBalances {
    pub fn fallback() -> Self {
        Self {
            native: DEMO_NATIVE_BALANCE,
            reward: DEMO_REWARD_BALANCE,
            payment: DEMO_PAYMENT_BALANCE,
            origin: DataOrigin::Synthetic,
        }
    }

    pub fn get(&self, token: TokenKind) -> U256 {
        match token {
            TokenKind::Native => self.native,
            TokenKind::Reward => self.reward,
            TokenKind::Payment => self.payment,
        }
    }

    pub fn display(&self, token: TokenKind) -> String {
        format_display(self.get(token), token.decimals(), 2)
    }

    /// Sum of all three balances as nominal units. Display only.
    pub fn total_value(&self) -> f64 {
        [TokenKind::Native, TokenKind::Reward, TokenKind::Payment]
            .into_iter()
            .map(|token| {
                format_units(self.get(token), token.decimals())
                    .parse::<f64>()
                    .unwrap_or(0.0)
            })
            .sum()
    }

    pub fn total_value_display(&self) -> String {
        format!("{:.2}", self.total_value())
    }
}

pub struct BalancesFetcher {
    ledger: Arc<dyn LedgerSource>,
}

impl BalancesFetcher {
    pub fn new(ledger: Arc<dyn LedgerSource>) -> Self {
        Self { ledger }
    }

    async fn token_or_demo(&self, token: TokenKind, account: Address, demo: U256) -> (U256, bool) {
        match self.ledger.balance(token, account).await {
            Ok(balance) => (balance, false),
            Err(e) => {
                warn!(
                    token = token.symbol(),
                    account = %account,
                    error = %e,
                    "Token balance read failed, using demo balance"
                );
                (demo, true)
            }
        }
    }
}

#[async_trait]
impl Fetch for BalancesFetcher {
    type Output = DashboardBalances;
    const NAME: &'static str = "balances";

    async fn fetch(&self, account: Option<Address>) -> Fetched<DashboardBalances> {
        let Some(account) = account else {
            return Fetched::fresh(DashboardBalances::default());
        };

        let native = match self.ledger.balance(TokenKind::Native, account).await {
            Ok(native) => native,
            Err(e) => {
                warn!(
                    account = %account,
                    error = %e,
                    "Dashboard balance fetch failed, using demo balances"
                );
                return Fetched::fallback(DashboardBalances::fallback());
            }
        };

        let (reward, reward_failed) = self
            .token_or_demo(TokenKind::Reward, account, DEMO_REWARD_BALANCE)
            .await;
        let (payment, payment_failed) = self
            .token_or_demo(TokenKind::Payment, account, DEMO_PAYMENT_BALANCE)
            .await;
        let fallback = reward_failed || payment_failed;

        let origin = if fallback {
            DataOrigin::Synthetic
        } else {
            self.ledger.origin()
        };

        Fetched {
            value: DashboardBalances {
                native,
                reward,
                payment,
                origin,
            },
            fallback,
        }
    }
}
