//! Wallet session state
//!
//! [`SessionManager`] owns the connected account and chain, mediates every
//! request to the wallet provider, and publishes the current [`Session`] as a
//! `watch` store. Provider notifications are consumed by a listener task that
//! lives exactly as long as the manager.

use std::sync::{Arc, Mutex};

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{DataChanged, EventBus, RefreshAction};
use crate::error::{ClientError, ClientResult};
use crate::network::{is_wrong_network, AddChainParams, TEMPO_CHAIN_ID};
use crate::wallet::{ProviderEvent, WalletProvider};

/// Session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Never connected
    #[default]
    Unauthenticated,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub is_wrong_network: bool,
    pub is_loading: bool,
    pub phase: SessionPhase,
    /// Bumped on every chain change; contract bindings older than this are stale
    pub generation: u64,
    /// User-facing instruction (e.g. install a wallet)
    pub notice: Option<String>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    fn set_connected(&mut self, account: Address, chain_id: Option<u64>) {
        self.account = Some(account);
        self.chain_id = chain_id;
        self.phase = SessionPhase::Connected;
        self.notice = None;
        self.recompute();
    }

    fn set_chain(&mut self, chain_id: u64) {
        if self.account.is_some() {
            self.chain_id = Some(chain_id);
        }
        self.generation += 1;
        self.recompute();
    }

    /// Apply a chain id reported by the wallet. Returns false when the session
    /// already reflects it.
    fn observe_chain(&mut self, chain_id: u64) -> bool {
        if self.account.is_some() && self.chain_id == Some(chain_id) {
            return false;
        }
        self.set_chain(chain_id);
        true
    }

    fn clear(&mut self) {
        self.account = None;
        self.chain_id = None;
        self.is_loading = false;
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Disconnected;
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.account.is_none() {
            self.chain_id = None;
        }
        self.is_wrong_network = self.account.is_some() && is_wrong_network(self.chain_id);
    }
}

pub struct SessionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    state: Arc<watch::Sender<Session>>,
    bus: EventBus,
    network: AddChainParams,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create the session, restore any already-authorized account without
    /// prompting, and subscribe to provider notifications.
    pub async fn start(
        provider: Option<Arc<dyn WalletProvider>>,
        bus: EventBus,
        network: AddChainParams,
    ) -> Arc<Self> {
        let (tx, _) = watch::channel(Session::default());
        let manager = Arc::new(Self {
            provider,
            state: Arc::new(tx),
            bus,
            network,
            listener: Mutex::new(None),
        });

        if let Some(provider) = manager.provider.clone() {
            // Subscribe before restoring so no notification is missed in between
            let events = provider.subscribe();
            manager.restore(provider.as_ref()).await;

            let handle = tokio::spawn(listen(provider, events, manager.state.clone()));
            if let Ok(mut slot) = manager.listener.lock() {
                *slot = Some(handle);
            }
        } else {
            debug!("No wallet provider configured");
        }

        manager
    }

    async fn restore(&self, provider: &dyn WalletProvider) {
        match provider.accounts().await {
            Ok(accounts) => {
                if let Some(account) = accounts.first().copied() {
                    let chain_id = provider.chain_id().await.ok();
                    self.state.send_modify(|s| s.set_connected(account, chain_id));
                    info!(account = %account, chain_id = ?chain_id, "Restored authorized wallet session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to query authorized accounts"),
        }
    }

    /// Request account access. Failures are logged and reflected in the
    /// session, never returned.
    pub async fn connect(&self) -> Option<Address> {
        let Some(provider) = self.provider.as_ref() else {
            warn!("Connect requested but no wallet provider is available");
            self.state
                .send_modify(|s| s.notice = Some(ClientError::ProviderAbsent.to_string()));
            return None;
        };

        self.set_loading(true);
        let result = provider.request_accounts().await;
        let connected = match result {
            Ok(accounts) => match accounts.first().copied() {
                Some(account) => {
                    let chain_id = match provider.chain_id().await {
                        Ok(id) => Some(id),
                        Err(e) => {
                            warn!(error = %e, "Failed to query chain id after connect");
                            None
                        }
                    };
                    self.state.send_modify(|s| s.set_connected(account, chain_id));
                    info!(account = %account, chain_id = ?chain_id, "Wallet connected");
                    Some(account)
                }
                None => {
                    warn!("Wallet returned no accounts");
                    None
                }
            },
            Err(e) if e.is_user_rejected() => {
                info!("User rejected the connection request");
                None
            }
            Err(e) => {
                error!(error = %e, "Wallet connection failed");
                None
            }
        };
        self.set_loading(false);
        connected
    }

    /// Forget the session locally. Provider-level permission is untouched.
    pub fn disconnect(&self) {
        self.state.send_modify(Session::clear);
        info!("Wallet disconnected");
    }

    /// Ask the wallet to switch to Tempo, adding the network if it is unknown.
    /// On success the session reflects the wallet's chain before this returns.
    pub async fn switch_network(&self) {
        let Some(provider) = self.provider.as_ref() else {
            warn!("Switch network requested but no wallet provider is available");
            return;
        };

        let target = self.network.numeric_chain_id().unwrap_or(TEMPO_CHAIN_ID);
        let switched = match provider.switch_chain(target).await {
            Ok(()) => {
                info!(chain_id = target, "Switched network");
                true
            }
            Err(e) if e.is_unrecognized_chain() => {
                info!(chain_id = target, "Network unknown to wallet, requesting add");
                match provider.add_chain(&self.network).await {
                    Ok(()) => true,
                    Err(add_err) => {
                        error!(error = %add_err, "Error adding Tempo network");
                        false
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Error switching to Tempo network");
                false
            }
        };
        if !switched {
            return;
        }

        match provider.chain_id().await {
            Ok(chain_id) => {
                if self.state.send_if_modified(|s| s.observe_chain(chain_id)) {
                    debug!(chain_id, "Session chain updated after switch");
                }
            }
            Err(e) => warn!(error = %e, "Failed to read chain id after switch"),
        }
    }

    /// Broadcast that on-chain data changed so views refetch
    pub fn refresh_data(&self, action: RefreshAction) -> DataChanged {
        self.bus.publish(action)
    }

    /// Signing wallet for the connected account
    pub fn signer(&self) -> ClientResult<EthereumWallet> {
        let provider = self.provider.as_ref().ok_or(ClientError::ProviderAbsent)?;
        if self.account().is_none() {
            return Err(ClientError::NotConnected);
        }
        provider.signer().ok_or(ClientError::NotConnected)
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.is_loading != loading;
            s.is_loading = loading;
            changed
        });
    }

    pub fn account(&self) -> Option<Address> {
        self.state.borrow().account
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Apply provider notifications to the session store
async fn listen(
    provider: Arc<dyn WalletProvider>,
    mut events: broadcast::Receiver<ProviderEvent>,
    state: Arc<watch::Sender<Session>>,
) {
    loop {
        match events.recv().await {
            Ok(ProviderEvent::AccountsChanged(accounts)) => match accounts.first().copied() {
                Some(account) => {
                    let (known_chain, phase) = {
                        let current = state.borrow();
                        (current.chain_id, current.phase)
                    };
                    if phase == SessionPhase::Disconnected {
                        debug!(account = %account, "Ignoring account change after local disconnect");
                        continue;
                    }
                    let chain_id = match known_chain {
                        Some(id) => Some(id),
                        None => provider.chain_id().await.ok(),
                    };
                    state.send_if_modified(|s| {
                        if s.account == Some(account) && s.chain_id == chain_id {
                            return false;
                        }
                        s.set_connected(account, chain_id);
                        true
                    });
                    info!(account = %account, "Wallet account changed");
                }
                None => {
                    state.send_modify(Session::clear);
                    info!("Wallet locked or authorization revoked");
                }
            },
            Ok(ProviderEvent::ChainChanged(chain_id)) => {
                if !state.send_if_modified(|s| s.observe_chain(chain_id)) {
                    debug!(chain_id, "Chain change already applied");
                    continue;
                }
                let session = state.borrow().clone();
                info!(
                    chain_id,
                    wrong_network = session.is_wrong_network,
                    generation = session.generation,
                    "Network changed, rebinding"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                if state.borrow().phase == SessionPhase::Disconnected {
                    debug!(skipped, "Missed wallet notifications after local disconnect");
                    continue;
                }
                warn!(skipped, "Missed wallet notifications, resyncing");
                let accounts = provider.accounts().await.unwrap_or_default();
                let chain_id = provider.chain_id().await.ok();
                state.send_modify(|s| match accounts.first().copied() {
                    Some(account) => s.set_connected(account, chain_id),
                    None => s.clear(),
                });
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Wallet notification channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NativeCurrency;
    use crate::wallet::LocalWallet;
    use std::time::Duration;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn other_chain() -> AddChainParams {
        AddChainParams {
            chain_id: "0x7A69".to_string(),
            chain_name: "Anvil".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["http://localhost:8545".to_string()],
            block_explorer_urls: Vec::new(),
        }
    }

    async fn wait_for<F: Fn(&Session) -> bool>(rx: &mut watch::Receiver<Session>, pred: F) -> Session {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
            .await
            .expect("session condition not reached")
            .expect("session closed")
            .clone()
    }

    #[test]
    fn test_session_invariants() {
        let mut s = Session::default();
        s.set_chain(1);
        assert_eq!(s.chain_id, None);
        assert!(!s.is_wrong_network);

        s.set_connected(Address::repeat_byte(1), Some(1));
        assert!(s.is_wrong_network);
        s.set_chain(TEMPO_CHAIN_ID);
        assert!(!s.is_wrong_network);

        s.clear();
        assert_eq!(s.account, None);
        assert_eq!(s.chain_id, None);
        assert!(!s.is_wrong_network);
        assert_eq!(s.phase, SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_without_provider_sets_notice() {
        let manager = SessionManager::start(None, EventBus::default(), AddChainParams::tempo()).await;
        assert_eq!(manager.connect().await, None);

        let session = manager.snapshot();
        assert_eq!(session.phase, SessionPhase::Unauthenticated);
        assert!(session.notice.unwrap().contains("Install a browser wallet"));
        assert_eq!(manager.signer().unwrap_err(), ClientError::ProviderAbsent);
    }

    #[tokio::test]
    async fn test_restores_authorized_account() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), true).unwrap());
        let address = wallet.address();
        let manager = SessionManager::start(Some(wallet), EventBus::default(), AddChainParams::tempo()).await;

        let session = manager.snapshot();
        assert_eq!(session.account, Some(address));
        assert_eq!(session.chain_id, Some(TEMPO_CHAIN_ID));
        assert!(!session.is_wrong_network);
        assert!(manager.signer().is_ok());
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, other_chain(), false).unwrap());
        let manager =
            SessionManager::start(Some(wallet.clone()), EventBus::default(), AddChainParams::tempo()).await;
        assert_eq!(manager.account(), None);

        let account = manager.connect().await;
        assert_eq!(account, Some(wallet.address()));
        let session = manager.snapshot();
        assert_eq!(session.chain_id, Some(31337));
        assert!(session.is_wrong_network);
        assert!(!session.is_loading);

        manager.disconnect();
        let session = manager.snapshot();
        assert_eq!(session.account, None);
        assert!(!session.is_wrong_network);
        assert_eq!(session.phase, SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_switch_network_adds_unknown_chain() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, other_chain(), true).unwrap());
        let manager =
            SessionManager::start(Some(wallet.clone()), EventBus::default(), AddChainParams::tempo()).await;
        let mut rx = manager.subscribe();
        assert!(manager.snapshot().is_wrong_network);

        manager.switch_network().await;

        let session = manager.snapshot();
        assert_eq!(session.chain_id, Some(TEMPO_CHAIN_ID));
        assert!(!session.is_wrong_network);
        assert_eq!(session.generation, 1);
        assert!(wallet.known_chains().contains(&TEMPO_CHAIN_ID));

        // The wallet's own notification for the same chain does not bump again
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.snapshot().generation, 1);
        assert!(!rx.borrow_and_update().is_wrong_network);
    }

    #[tokio::test]
    async fn test_switch_to_known_chain_is_applied_on_return() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), true).unwrap());
        wallet.add_chain(&other_chain()).await.unwrap();
        let manager =
            SessionManager::start(Some(wallet.clone()), EventBus::default(), AddChainParams::tempo()).await;
        assert_eq!(manager.snapshot().chain_id, Some(31337));

        manager.switch_network().await;
        let session = manager.snapshot();
        assert_eq!(session.chain_id, Some(TEMPO_CHAIN_ID));
        assert!(!session.is_wrong_network);
    }

    #[tokio::test]
    async fn test_resync_after_missed_notifications_keeps_disconnect() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), true).unwrap());
        wallet.add_chain(&other_chain()).await.unwrap();
        let manager =
            SessionManager::start(Some(wallet.clone()), EventBus::default(), AddChainParams::tempo()).await;
        manager.disconnect();

        // Overflow the notification buffer before the listener runs
        for _ in 0..20 {
            wallet.switch_chain(TEMPO_CHAIN_ID).await.unwrap();
            wallet.switch_chain(31337).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let session = manager.snapshot();
        assert_eq!(session.account, None);
        assert_eq!(session.phase, SessionPhase::Disconnected);
        assert!(!session.is_wrong_network);
    }

    #[tokio::test]
    async fn test_revoked_accounts_clear_session() {
        let wallet = Arc::new(LocalWallet::from_private_key(TEST_KEY, AddChainParams::tempo(), true).unwrap());
        let manager =
            SessionManager::start(Some(wallet.clone()), EventBus::default(), AddChainParams::tempo()).await;
        let mut rx = manager.subscribe();

        wallet.revoke();

        let session = wait_for(&mut rx, |s| s.account.is_none()).await;
        assert_eq!(session.phase, SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_refresh_data_broadcasts() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let manager = SessionManager::start(None, bus, AddChainParams::tempo()).await;

        manager.refresh_data(RefreshAction::Purchase);
        assert_eq!(events.recv().await.unwrap().action, RefreshAction::Purchase);
    }
}
