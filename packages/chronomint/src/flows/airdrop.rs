//! Airdrop claim flow
//!
//! `initial -> tasks -> checking -> result`. The claim status only exists in
//! `result`; a failed claim keeps the account `eligible` so it can retry.

use std::sync::Arc;

use alloy::primitives::U256;
use serde::Serialize;
use tracing::{info, warn};

use crate::bus::RefreshAction;
use crate::error::{ClientError, ClientResult};
use crate::ledger::fixture::DEMO_AIRDROP_AMOUNT;
use crate::ledger::{LedgerSource, TxReceipt};
use crate::metrics::Metrics;
use crate::session::SessionManager;
use crate::units::{format_display, REWARD_DECIMALS};

const CLAIM_FAILED_MESSAGE: &str = "Transaction failed. Please check your balance.";
const CLAIM_PENDING_MESSAGE: &str = "Waiting for claim confirmation...";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStep {
    #[default]
    Initial,
    Tasks,
    Checking,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimStatus {
    Eligible,
    NotEligible,
    Claimed,
    Error,
}

/// Actions offered on the result screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimAction {
    Claim,
    Reset,
    OpenDashboard,
}

/// A prior claim wins over eligibility; any failed read is an error
pub fn resolve_claim_status(
    has_claimed: ClientResult<bool>,
    is_eligible: ClientResult<bool>,
) -> ClaimStatus {
    match (has_claimed, is_eligible) {
        (Err(_), _) | (_, Err(_)) => ClaimStatus::Error,
        (Ok(true), Ok(_)) => ClaimStatus::Claimed,
        (Ok(false), Ok(true)) => ClaimStatus::Eligible,
        (Ok(false), Ok(false)) => ClaimStatus::NotEligible,
    }
}

pub struct ClaimFlow {
    session: Arc<SessionManager>,
    ledger: Arc<dyn LedgerSource>,
    metrics: Option<Arc<Metrics>>,
    step: ClaimStep,
    task_completed: bool,
    claim_status: Option<ClaimStatus>,
    error_message: Option<String>,
    airdrop_amount: U256,
}

impl ClaimFlow {
    pub fn new(session: Arc<SessionManager>, ledger: Arc<dyn LedgerSource>) -> Self {
        Self {
            session,
            ledger,
            metrics: None,
            step: ClaimStep::Initial,
            task_completed: false,
            claim_status: None,
            error_message: None,
            airdrop_amount: DEMO_AIRDROP_AMOUNT,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn step(&self) -> ClaimStep {
        self.step
    }

    pub fn task_completed(&self) -> bool {
        self.task_completed
    }

    pub fn claim_status(&self) -> Option<ClaimStatus> {
        self.claim_status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn airdrop_amount(&self) -> U256 {
        self.airdrop_amount
    }

    /// e.g. `"1,250"`
    pub fn airdrop_amount_display(&self) -> String {
        format_display(self.airdrop_amount, REWARD_DECIMALS, 0)
    }

    /// "Check eligibility": connect first if needed, otherwise show the task
    pub async fn start(&mut self) -> ClientResult<ClaimStep> {
        if self.step != ClaimStep::Initial {
            return Err(ClientError::InvalidStep("the claim flow is already started"));
        }
        if self.session.account().is_none() {
            self.session.connect().await;
            return Ok(self.step);
        }
        self.step = ClaimStep::Tasks;
        self.error_message = None;
        Ok(self.step)
    }

    /// Mark the social task done (client-side only)
    pub fn complete_task(&mut self) -> ClientResult<()> {
        if self.step != ClaimStep::Tasks {
            return Err(ClientError::InvalidStep("not on the task step"));
        }
        self.task_completed = true;
        Ok(())
    }

    pub fn back(&mut self) -> ClientResult<()> {
        if self.step != ClaimStep::Tasks {
            return Err(ClientError::InvalidStep("not on the task step"));
        }
        self.step = ClaimStep::Initial;
        Ok(())
    }

    /// Query claim history and eligibility and move to the result step
    pub async fn verify_and_check(&mut self) -> ClientResult<ClaimStatus> {
        if self.step != ClaimStep::Tasks {
            return Err(ClientError::InvalidStep("not on the task step"));
        }
        if !self.task_completed {
            return Err(ClientError::InvalidStep("the social task is not completed"));
        }

        self.step = ClaimStep::Checking;
        self.error_message = None;

        let status = match self.session.account() {
            Some(account) => {
                let ledger = self.ledger.as_ref();
                let (has_claimed, is_eligible, amount) = tokio::join!(
                    ledger.has_claimed(account),
                    ledger.is_eligible(account),
                    ledger.airdrop_amount(),
                );
                if let Err(e) = has_claimed.as_ref().and(is_eligible.as_ref()) {
                    warn!(account = %account, error = %e, "Eligibility check failed");
                }
                match amount {
                    Ok(amount) => self.airdrop_amount = amount,
                    Err(e) => warn!(error = %e, "Airdrop amount read failed"),
                }
                resolve_claim_status(has_claimed, is_eligible)
            }
            None => {
                warn!("Eligibility check without a connected account");
                ClaimStatus::Error
            }
        };

        info!(status = ?status, "Eligibility resolved");
        self.claim_status = Some(status);
        self.step = ClaimStep::Result;
        Ok(status)
    }

    /// Submit the claim. Only available while eligible.
    pub async fn claim(&mut self) -> ClientResult<TxReceipt> {
        if self.step != ClaimStep::Result || self.claim_status != Some(ClaimStatus::Eligible) {
            return Err(ClientError::InvalidStep("the account is not eligible to claim"));
        }
        self.error_message = None;

        match self.submit_claim().await {
            Ok(receipt) => {
                info!(tx_hash = %receipt.tx_hash, "Airdrop claimed");
                self.claim_status = Some(ClaimStatus::Claimed);
                self.error_message = None;
                self.record("confirmed");
                self.session.refresh_data(RefreshAction::Claim);
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "Claim failed");
                self.error_message = Some(claim_failure_message(&e));
                self.record(if e.is_user_rejected() { "rejected" } else { e.kind() });
                Err(e)
            }
        }
    }

    async fn submit_claim(&mut self) -> ClientResult<TxReceipt> {
        let wallet = self.session.signer()?;
        let pending = self.ledger.claim_airdrop(&wallet).await?;
        self.error_message = Some(CLAIM_PENDING_MESSAGE.to_string());
        pending.confirmed().await
    }

    /// Start over from a not-eligible or failed result
    pub fn reset(&mut self) -> ClientResult<()> {
        match (self.step, self.claim_status) {
            (ClaimStep::Result, Some(ClaimStatus::NotEligible | ClaimStatus::Error)) => {
                self.step = ClaimStep::Initial;
                self.claim_status = None;
                self.task_completed = false;
                self.error_message = None;
                Ok(())
            }
            _ => Err(ClientError::InvalidStep("there is nothing to reset")),
        }
    }

    pub fn available_actions(&self) -> Vec<ClaimAction> {
        if self.step != ClaimStep::Result {
            return Vec::new();
        }
        match self.claim_status {
            Some(ClaimStatus::Eligible) => vec![ClaimAction::Claim],
            Some(ClaimStatus::NotEligible | ClaimStatus::Error) => vec![ClaimAction::Reset],
            Some(ClaimStatus::Claimed) => vec![ClaimAction::OpenDashboard],
            None => Vec::new(),
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_transaction("claim", outcome);
        }
    }
}

/// The fixed failure text, with the revert reason when the chain gave one
fn claim_failure_message(error: &ClientError) -> String {
    match error {
        ClientError::Revert(reason) if !reason.is_empty() => {
            format!("{} ({})", CLAIM_FAILED_MESSAGE, reason)
        }
        _ => CLAIM_FAILED_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_err() -> ClientResult<bool> {
        Err(ClientError::Read("rpc down".to_string()))
    }

    #[test]
    fn test_claim_status_mapping() {
        assert_eq!(resolve_claim_status(Ok(true), Ok(true)), ClaimStatus::Claimed);
        assert_eq!(resolve_claim_status(Ok(true), Ok(false)), ClaimStatus::Claimed);
        assert_eq!(resolve_claim_status(Ok(false), Ok(true)), ClaimStatus::Eligible);
        assert_eq!(resolve_claim_status(Ok(false), Ok(false)), ClaimStatus::NotEligible);
        assert_eq!(resolve_claim_status(read_err(), Ok(true)), ClaimStatus::Error);
        assert_eq!(resolve_claim_status(Ok(true), read_err()), ClaimStatus::Error);
        assert_eq!(resolve_claim_status(read_err(), read_err()), ClaimStatus::Error);
    }

    #[test]
    fn test_claim_failure_carries_revert_reason() {
        assert_eq!(
            claim_failure_message(&ClientError::Revert("execution reverted: Already claimed".to_string())),
            "Transaction failed. Please check your balance. (execution reverted: Already claimed)"
        );
        assert_eq!(
            claim_failure_message(&ClientError::UserRejected),
            CLAIM_FAILED_MESSAGE
        );
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ClaimStatus::NotEligible).unwrap(),
            "not-eligible"
        );
        assert_eq!(serde_json::to_value(ClaimStep::Checking).unwrap(), "checking");
    }
}
