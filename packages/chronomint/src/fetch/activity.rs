//! CHRONO transfer history for the dashboard
//!
//! Incoming and outgoing Transfer logs over the last [`LOOKBACK_BLOCKS`] are
//! merged, de-duplicated by log position and sorted newest first. When the
//! ledger has nothing to show, or any read fails, a fixed demo list is used.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::DateTime;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::{DataOrigin, Fetch, Fetched};
use crate::error::ClientResult;
use crate::ledger::{LedgerSource, TokenKind, TransferDirection, TransferLog};
use crate::units::{format_display, shorten_hex};

pub const LOOKBACK_BLOCKS: u64 = 1000;
pub const MAX_RECORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub action: String,
    /// e.g. `"1,250.00 CHRONO"`
    pub amount: String,
    pub status: String,
    /// `M/D/YYYY`, UTC
    pub date: String,
    /// Shortened, e.g. `"0x1a2b...c3d4"`
    pub tx_hash: String,
    /// Absent for demo records
    pub block_number: Option<u64>,
}

impl ActivityRecord {
    fn demo(action: &str, amount: &str, date: &str, hash: &str) -> Self {
        Self {
            action: action.to_string(),
            amount: amount.to_string(),
            status: "Confirmed".to_string(),
            date: date.to_string(),
            tx_hash: hash.to_string(),
            block_number: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityFeed {
    pub records: Vec<ActivityRecord>,
    pub origin: DataOrigin,
    pub latest_block: Option<u64>,
}

/// Shown when the account has no transfers in range
pub fn demo_activity() -> Vec<ActivityRecord> {
    vec![
        ActivityRecord::demo("Received CHRONO", "1,250.00 CHRONO", "1/5/2026", "0x1a2b...c3d4"),
        ActivityRecord::demo("Sent CHRONO", "250.00 CHRONO", "1/4/2026", "0x4e5f...g6h7"),
        ActivityRecord::demo("Received CHRONO", "500.00 CHRONO", "1/3/2026", "0x7i8j...k9l0"),
        ActivityRecord::demo("Presale Purchase", "100.00 CHRONO", "1/2/2026", "0xm1n2...o3p4"),
        ActivityRecord::demo("Airdrop Claim", "250.00 CHRONO", "1/1/2026", "0xq5r6...s7t8"),
    ]
}

/// Shown when reading history failed
pub fn degraded_activity() -> Vec<ActivityRecord> {
    demo_activity().into_iter().take(2).collect()
}

/// Merge both directions, drop duplicates (self-transfers), newest first, capped
pub fn merge_transfers(incoming: Vec<TransferLog>, outgoing: Vec<TransferLog>) -> Vec<TransferLog> {
    let mut seen: HashSet<(B256, u64)> = HashSet::new();
    let mut merged: Vec<TransferLog> = incoming
        .into_iter()
        .chain(outgoing)
        .filter(|log| seen.insert((log.tx_hash, log.log_index)))
        .collect();
    merged.sort_by(|a, b| {
        b.block_number
            .cmp(&a.block_number)
            .then(b.log_index.cmp(&a.log_index))
    });
    merged.truncate(MAX_RECORDS);
    merged
}

fn format_date(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%-m/%-d/%Y").to_string())
        .unwrap_or_default()
}

fn to_record(log: &TransferLog, account: Address, timestamp: u64) -> ActivityRecord {
    let action = if log.to == account {
        "Received CHRONO"
    } else {
        "Sent CHRONO"
    };
    ActivityRecord {
        action: action.to_string(),
        amount: format!(
            "{} {}",
            format_display(log.value, TokenKind::Reward.decimals(), 2),
            TokenKind::Reward.symbol()
        ),
        status: "Confirmed".to_string(),
        date: format_date(timestamp),
        tx_hash: shorten_hex(&log.tx_hash.to_string()),
        block_number: Some(log.block_number),
    }
}

pub struct ActivityFetcher {
    ledger: Arc<dyn LedgerSource>,
}

impl ActivityFetcher {
    pub fn new(ledger: Arc<dyn LedgerSource>) -> Self {
        Self { ledger }
    }

    async fn history(&self, account: Address) -> ClientResult<(Vec<ActivityRecord>, u64)> {
        let latest = self.ledger.latest_block().await?;
        let from = latest.saturating_sub(LOOKBACK_BLOCKS);

        let (incoming, outgoing) = futures::try_join!(
            self.ledger
                .reward_transfers(TransferDirection::Incoming, account, from, latest),
            self.ledger
                .reward_transfers(TransferDirection::Outgoing, account, from, latest),
        )?;
        let logs = merge_transfers(incoming, outgoing);

        let blocks: BTreeSet<u64> = logs.iter().map(|log| log.block_number).collect();
        let timestamps: HashMap<u64, u64> = try_join_all(blocks.into_iter().map(|block| async move {
            self.ledger
                .block_timestamp(block)
                .await
                .map(|ts| (block, ts))
        }))
        .await?
        .into_iter()
        .collect();

        let records = logs
            .iter()
            .map(|log| {
                let ts = timestamps.get(&log.block_number).copied().unwrap_or_default();
                to_record(log, account, ts)
            })
            .collect();
        Ok((records, latest))
    }
}

#[async_trait]
impl Fetch for ActivityFetcher {
    type Output = ActivityFeed;
    const NAME: &'static str = "activity";

    async fn fetch(&self, account: Option<Address>) -> Fetched<ActivityFeed> {
        let Some(account) = account else {
            return Fetched::fresh(ActivityFeed::default());
        };

        match self.history(account).await {
            Ok((records, latest)) if records.is_empty() => {
                debug!(account = %account, latest, "No recent transfers, showing demo activity");
                Fetched::fresh(ActivityFeed {
                    records: demo_activity(),
                    origin: DataOrigin::Synthetic,
                    latest_block: Some(latest),
                })
            }
            Ok((records, latest)) => {
                Fetched::fresh(ActivityFeed {
                    records,
                    origin: self.ledger.origin(),
                    latest_block: Some(latest),
                })
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Error fetching activity");
                Fetched::fallback(ActivityFeed {
                    records: degraded_activity(),
                    origin: DataOrigin::Synthetic,
                    latest_block: None,
                })
            }
        }
    }
}
