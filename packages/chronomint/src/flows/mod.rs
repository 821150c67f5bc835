//! Write flows
//!
//! - `presale` - approve USDC, then buy CHRONO
//! - `airdrop` - social task, eligibility check, claim

pub mod airdrop;
pub mod presale;

use serde::Serialize;

pub use airdrop::{resolve_claim_status, ClaimAction, ClaimFlow, ClaimStatus, ClaimStep};
pub use presale::{needs_approval, PrimaryAction, PurchaseFlow, PurchasePhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

/// Progress message surfaced to the user during a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub message: String,
}

impl StatusMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind != StatusKind::Info
    }
}
