//! Client wiring
//!
//! [`App`] owns the ledger, the wallet session and the three pollers, and
//! hands out write flows bound to them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::config::{Config, DataSource};
use crate::fetch::{
    spawn_poller, store, ActivityFeed, ActivityFetcher, BalancesFetcher, DashboardBalances,
    PollerHandle, PollerOptions, PresaleFetcher, PresaleState,
};
use crate::flows::{ClaimFlow, PurchaseFlow, StatusMessage};
use crate::ledger::{LedgerSource, LiveLedger, SyntheticLedger};
use crate::metrics::Metrics;
use crate::network::AddChainParams;
use crate::server::StatusView;
use crate::session::{Session, SessionManager};
use crate::wallet::{LocalWallet, WalletProvider};

pub struct App {
    ledger: Arc<dyn LedgerSource>,
    wallet: Option<Arc<LocalWallet>>,
    session: Arc<SessionManager>,
    metrics: Arc<Metrics>,
    presale: PollerHandle<PresaleState>,
    balances: PollerHandle<DashboardBalances>,
    activity: PollerHandle<ActivityFeed>,
    settle_delay: std::time::Duration,
    presale_end: DateTime<Utc>,
}

impl App {
    /// Build the ledger and wallet described by `config`, then start the session
    /// and pollers
    pub async fn start(config: &Config) -> Result<Self> {
        let ledger: Arc<dyn LedgerSource> = match config.data_source {
            DataSource::Live => {
                let addresses = config
                    .contracts
                    .ok_or_else(|| eyre!("Live data source without contract addresses"))?;
                Arc::new(LiveLedger::new(&config.rpc_url, addresses)?)
            }
            DataSource::Synthetic => Arc::new(SyntheticLedger::new()),
        };

        let wallet = match &config.private_key {
            Some(key) => Some(Arc::new(
                Self::attach_wallet(config, key, config.auto_connect).await?,
            )),
            None => None,
        };

        Self::with_parts(config, ledger, wallet).await
    }

    async fn attach_wallet(config: &Config, key: &str, authorized: bool) -> Result<LocalWallet> {
        match config.data_source {
            DataSource::Live => match LocalWallet::detect(&config.rpc_url, key, authorized).await {
                Ok(wallet) => Ok(wallet),
                Err(e) => {
                    warn!(error = %e, "Chain detection failed, assuming Tempo");
                    LocalWallet::from_private_key(
                        key,
                        AddChainParams::tempo_with_rpc(&config.rpc_url),
                        authorized,
                    )
                }
            },
            DataSource::Synthetic => LocalWallet::from_private_key(
                key,
                AddChainParams::tempo_with_rpc(&config.rpc_url),
                authorized,
            ),
        }
    }

    /// Start on an explicit ledger and wallet
    pub async fn with_parts(
        config: &Config,
        ledger: Arc<dyn LedgerSource>,
        wallet: Option<Arc<LocalWallet>>,
    ) -> Result<Self> {
        let bus = EventBus::default();
        let provider = wallet
            .clone()
            .map(|wallet| wallet as Arc<dyn WalletProvider>);
        let session = SessionManager::start(
            provider,
            bus.clone(),
            AddChainParams::tempo_with_rpc(&config.rpc_url),
        )
        .await;
        let metrics = Arc::new(Metrics::new());

        let options = |interval| PollerOptions {
            interval,
            metrics: Some(metrics.clone()),
        };

        let presale = spawn_poller(
            Arc::new(PresaleFetcher::new(ledger.clone())),
            store(PresaleState::initial()),
            session.subscribe(),
            &bus,
            options(config.presale_poll()),
        );
        let balances = spawn_poller(
            Arc::new(BalancesFetcher::new(ledger.clone())),
            store(DashboardBalances::default()),
            session.subscribe(),
            &bus,
            options(config.balance_poll()),
        );
        let activity = spawn_poller(
            Arc::new(ActivityFetcher::new(ledger.clone())),
            store(ActivityFeed::default()),
            session.subscribe(),
            &bus,
            options(config.activity_poll()),
        );

        info!(
            ledger = ledger.label(),
            wallet = session.has_provider(),
            account = ?session.account(),
            "Client started"
        );

        Ok(Self {
            ledger,
            wallet,
            session,
            metrics,
            presale,
            balances,
            activity,
            settle_delay: config.purchase_settle(),
            presale_end: config.presale_end,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerSource> {
        &self.ledger
    }

    pub fn wallet(&self) -> Option<&Arc<LocalWallet>> {
        self.wallet.as_ref()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn presale(&self) -> &PollerHandle<PresaleState> {
        &self.presale
    }

    pub fn balances(&self) -> &PollerHandle<DashboardBalances> {
        &self.balances
    }

    pub fn activity(&self) -> &PollerHandle<ActivityFeed> {
        &self.activity
    }

    pub fn presale_end(&self) -> DateTime<Utc> {
        self.presale_end
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Purchase flow that re-polls presale totals once a purchase settles
    pub fn purchase_flow(&self, status: mpsc::UnboundedSender<StatusMessage>) -> PurchaseFlow {
        PurchaseFlow::new(
            self.session.clone(),
            self.ledger.clone(),
            self.presale.store().clone(),
            status,
        )
        .with_refresh(self.presale.trigger(), self.settle_delay)
        .with_metrics(self.metrics.clone())
    }

    pub fn claim_flow(&self) -> ClaimFlow {
        ClaimFlow::new(self.session.clone(), self.ledger.clone()).with_metrics(self.metrics.clone())
    }

    /// Read-only handles for the status server
    pub fn status_view(&self) -> StatusView {
        StatusView {
            session: self.session.subscribe(),
            presale: self.presale.subscribe(),
            balances: self.balances.subscribe(),
            activity: self.activity.subscribe(),
            presale_cycles: self.presale.subscribe_cycles(),
            presale_end: self.presale_end,
            ledger: self.ledger.label(),
            metrics: self.metrics.clone(),
        }
    }

    /// Wait until every poller has published at least once
    pub async fn ready(&self) {
        let mut presale = self.presale.subscribe_cycles();
        let mut balances = self.balances.subscribe_cycles();
        let mut activity = self.activity.subscribe_cycles();
        let _ = tokio::join!(
            presale.wait_for(|n| *n > 0),
            balances.wait_for(|n| *n > 0),
            activity.wait_for(|n| *n > 0),
        );
    }

    /// Re-read presale state for the current account and wait for it to land
    pub async fn refresh_presale(&self) {
        let mut cycles = self.presale.subscribe_cycles();
        let seen = *cycles.borrow_and_update();
        self.presale.refresh();
        let _ = cycles.wait_for(|n| *n > seen).await;
    }

    pub fn shutdown(&self) {
        self.presale.stop();
        self.balances.stop();
        self.activity.stop();
        info!("Pollers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_start_without_wallet() {
        let app = App::start(&Config::synthetic()).await.unwrap();
        app.ready().await;

        assert!(!app.session().has_provider());
        assert_eq!(app.ledger().label(), "synthetic");
        let presale = app.presale().store().borrow().clone();
        assert_eq!(presale.progress_label(), "65.0%");
        assert_eq!(app.balances().store().borrow().total_value_display(), "0.00");
        app.shutdown();
    }
}
