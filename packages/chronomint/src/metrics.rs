//! Prometheus metrics

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::session::Session;

/// Content type of [`Metrics::encode`] output
pub const METRICS_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

pub struct Metrics {
    /// Completed fetch cycles, by fetcher
    pub fetches_total: IntCounterVec,
    /// Fetch cycles that fell back to synthetic values, by fetcher
    pub fallbacks_total: IntCounterVec,
    /// Store updates that changed the published value, by fetcher
    pub store_updates_total: IntCounterVec,
    /// Write transactions by action and outcome
    pub transactions_total: IntCounterVec,
    /// 1 while a wallet account is connected
    pub wallet_connected: IntGauge,
    /// 1 while the wallet is on the wrong network
    pub wrong_network: IntGauge,
    /// Latest block number seen by the activity fetcher
    pub last_block: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let fetches_total = IntCounterVec::new(
            Opts::new("chronomint_fetches_total", "Total number of completed fetch cycles"),
            &["fetcher", "trigger"],
        )
        .expect("constant metric name is valid");

        let fallbacks_total = IntCounterVec::new(
            Opts::new(
                "chronomint_fetch_fallbacks_total",
                "Fetch cycles that substituted synthetic fallback values",
            ),
            &["fetcher"],
        )
        .expect("constant metric name is valid");

        let store_updates_total = IntCounterVec::new(
            Opts::new(
                "chronomint_store_updates_total",
                "Fetch cycles that changed the published state",
            ),
            &["fetcher"],
        )
        .expect("constant metric name is valid");

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "chronomint_transactions_total",
                "Write transactions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("constant metric name is valid");

        let wallet_connected = IntGauge::new(
            "chronomint_wallet_connected",
            "Whether a wallet account is connected",
        )
        .expect("constant metric name is valid");

        let wrong_network = IntGauge::new(
            "chronomint_wallet_wrong_network",
            "Whether the wallet is on a network other than Tempo",
        )
        .expect("constant metric name is valid");

        let last_block = IntGauge::new(
            "chronomint_last_block_seen",
            "Latest block number seen by the activity fetcher",
        )
        .expect("constant metric name is valid");

        // Names are unique constants and registration happens once per instance
        registry
            .register(Box::new(fetches_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(fallbacks_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(store_updates_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(transactions_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(wallet_connected.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(wrong_network.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(last_block.clone()))
            .expect("metric registration must not be called twice");

        Self {
            fetches_total,
            fallbacks_total,
            store_updates_total,
            transactions_total,
            wallet_connected,
            wrong_network,
            last_block,
            registry,
        }
    }

    pub fn record_transaction(&self, action: &str, outcome: &str) {
        self.transactions_total
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn observe_session(&self, session: &Session) {
        self.wallet_connected.set(i64::from(session.is_connected()));
        self.wrong_network.set(i64::from(session.is_wrong_network));
    }

    /// Only moves forward; `None` keeps the last value
    pub fn observe_block(&self, block: Option<u64>) {
        if let Some(block) = block {
            let block = i64::try_from(block).unwrap_or(i64::MAX);
            if block > self.last_block.get() {
                self.last_block.set(block);
            }
        }
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once_per_instance() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.record_transaction("buy", "confirmed");
        assert_eq!(
            a.transactions_total
                .with_label_values(&["buy", "confirmed"])
                .get(),
            1
        );
        assert_eq!(
            b.transactions_total
                .with_label_values(&["buy", "confirmed"])
                .get(),
            0
        );
        assert!(!a.registry.gather().is_empty());
    }

    #[test]
    fn test_gauges_follow_session_and_blocks() {
        let metrics = Metrics::new();
        let session = Session {
            account: Some(alloy::primitives::Address::repeat_byte(1)),
            chain_id: Some(1),
            is_wrong_network: true,
            ..Session::default()
        };
        metrics.observe_session(&session);
        metrics.observe_block(Some(120));
        metrics.observe_block(Some(90));
        metrics.observe_block(None);

        assert_eq!(metrics.wallet_connected.get(), 1);
        assert_eq!(metrics.wrong_network.get(), 1);
        assert_eq!(metrics.last_block.get(), 120);

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("chronomint_last_block_seen 120"));
        assert!(text.contains("chronomint_wallet_wrong_network 1"));
    }
}
