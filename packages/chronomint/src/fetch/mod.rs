//! Contract data fetchers
//!
//! Each fetcher turns ledger reads into one view value. A poller task runs a
//! fetcher on start, on a timer, when the session account or generation
//! changes, on every data-changed event and on manual trigger, and publishes
//! into a shared `watch` store.
//!
//! ## Submodules
//!
//! - `presale` - presale totals and the account's USDC position
//! - `balances` - dashboard token balances
//! - `activity` - recent CHRONO transfer history

pub mod activity;
pub mod balances;
pub mod presale;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::metrics::Metrics;
use crate::session::Session;

pub use activity::{ActivityFeed, ActivityFetcher, ActivityRecord};
pub use balances::{BalancesFetcher, DashboardBalances};
pub use presale::{PresaleFetcher, PresaleState};

/// Shared observable store
pub type Store<T> = Arc<watch::Sender<T>>;

pub fn store<T>(initial: T) -> Store<T> {
    let (tx, _) = watch::channel(initial);
    Arc::new(tx)
}

/// Where a fetched value came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    /// Synthetic values, from the fixture ledger or substituted after a read failure
    #[default]
    Synthetic,
}

/// Result of one fetch cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    /// A read failed and fallback values were substituted
    pub fallback: bool,
}

impl<T> Fetched<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            fallback: false,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            fallback: true,
        }
    }
}

#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    type Output: Clone + PartialEq + Send + Sync + 'static;

    /// Name used in logs and metrics
    const NAME: &'static str;

    /// Read the current value. Never fails; read errors yield fallbacks.
    async fn fetch(&self, account: Option<Address>) -> Fetched<Self::Output>;
}

/// Why a fetch cycle ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Session,
    DataChanged,
    Manual,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Session => "session",
            Trigger::DataChanged => "data_changed",
            Trigger::Manual => "manual",
        }
    }
}

/// Replace the store value only if it differs. Returns whether it changed.
pub fn update_store<T: PartialEq>(store: &watch::Sender<T>, value: T) -> bool {
    store.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

/// Run one fetch cycle and publish the result
pub async fn run_once<F: Fetch>(
    fetcher: &F,
    store: &watch::Sender<F::Output>,
    account: Option<Address>,
) -> Fetched<bool> {
    let fetched = fetcher.fetch(account).await;
    let changed = update_store(store, fetched.value);
    Fetched {
        value: changed,
        fallback: fetched.fallback,
    }
}

/// Request an out-of-schedule fetch
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshTrigger {
    pub fn now(&self) {
        // Closed only after the poller stopped
        let _ = self.tx.send(());
    }

    /// Trigger once `delay` has elapsed
    pub fn after(&self, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(());
        });
    }
}

/// Running poller
pub struct PollerHandle<T> {
    name: &'static str,
    task: JoinHandle<()>,
    paused: watch::Sender<bool>,
    trigger: RefreshTrigger,
    store: Store<T>,
    cycles: Arc<watch::Sender<u64>>,
}

impl<T> PollerHandle<T> {
    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn refresh(&self) {
        self.trigger.now();
    }

    /// Skip timer ticks until resumed. Event and manual triggers still fetch.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        debug!(fetcher = self.name, "Poller paused");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        debug!(fetcher = self.name, "Poller resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    /// Completed fetch cycles
    pub fn cycles(&self) -> u64 {
        *self.cycles.borrow()
    }

    /// Observe the completed cycle count
    pub fn subscribe_cycles(&self) -> watch::Receiver<u64> {
        self.cycles.subscribe()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for PollerHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Shortest timer period a poller runs with
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct PollerOptions {
    pub interval: Duration,
    pub metrics: Option<Arc<Metrics>>,
}

/// Spawn a poller publishing `fetcher` output into `store`
pub fn spawn_poller<F: Fetch>(
    fetcher: Arc<F>,
    store: Store<F::Output>,
    session: watch::Receiver<Session>,
    bus: &EventBus,
    options: PollerOptions,
) -> PollerHandle<F::Output> {
    let (manual_tx, manual_rx) = mpsc::unbounded_channel();
    let (paused_tx, paused_rx) = watch::channel(false);
    let (cycles, _) = watch::channel(0u64);
    let cycles = Arc::new(cycles);

    let task = tokio::spawn(poll_loop(
        fetcher,
        store.clone(),
        session,
        bus.subscribe(),
        manual_rx,
        paused_rx,
        options,
        cycles.clone(),
    ));

    PollerHandle {
        name: F::NAME,
        task,
        paused: paused_tx,
        trigger: RefreshTrigger { tx: manual_tx },
        store,
        cycles,
    }
}

#[allow(clippy::too_many_arguments)]
async fn poll_loop<F: Fetch>(
    fetcher: Arc<F>,
    store: Store<F::Output>,
    mut session: watch::Receiver<Session>,
    mut events: broadcast::Receiver<crate::bus::DataChanged>,
    mut manual: mpsc::UnboundedReceiver<()>,
    paused: watch::Receiver<bool>,
    options: PollerOptions,
    cycles: Arc<watch::Sender<u64>>,
) {
    let period = options.interval.max(MIN_POLL_INTERVAL);
    info!(fetcher = F::NAME, interval_ms = period.as_millis() as u64, "Poller starting");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let (mut account, mut generation) = {
        let current = session.borrow_and_update();
        (current.account, current.generation)
    };
    let mut session_open = true;
    let mut events_open = true;
    let mut manual_open = true;

    loop {
        let trigger = tokio::select! {
            // The first tick completes immediately and serves as the start fetch
            _ = ticker.tick() => {
                if *paused.borrow() {
                    continue;
                }
                Trigger::Timer
            }
            changed = session.changed(), if session_open => {
                if changed.is_err() {
                    session_open = false;
                    continue;
                }
                let (next_account, next_generation) = {
                    let current = session.borrow_and_update();
                    (current.account, current.generation)
                };
                if next_account == account && next_generation == generation {
                    continue;
                }
                account = next_account;
                generation = next_generation;
                Trigger::Session
            }
            event = events.recv(), if events_open => match event {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Trigger::DataChanged,
                Err(broadcast::error::RecvError::Closed) => {
                    events_open = false;
                    continue;
                }
            },
            msg = manual.recv(), if manual_open => match msg {
                Some(()) => Trigger::Manual,
                None => {
                    manual_open = false;
                    continue;
                }
            },
        };

        let outcome = run_once(fetcher.as_ref(), &store, account).await;
        cycles.send_modify(|n| *n += 1);
        debug!(
            fetcher = F::NAME,
            trigger = trigger.as_str(),
            account = ?account,
            changed = outcome.value,
            fallback = outcome.fallback,
            "Fetch cycle complete"
        );

        if let Some(metrics) = options.metrics.as_ref() {
            metrics
                .fetches_total
                .with_label_values(&[F::NAME, trigger.as_str()])
                .inc();
            if outcome.fallback {
                metrics.fallbacks_total.with_label_values(&[F::NAME]).inc();
            }
            if outcome.value {
                metrics.store_updates_total.with_label_values(&[F::NAME]).inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RefreshAction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the call count, optionally frozen at a fixed value
    struct Counter {
        calls: AtomicUsize,
        frozen: Option<u64>,
    }

    #[async_trait]
    impl Fetch for Counter {
        type Output = u64;
        const NAME: &'static str = "counter";

        async fn fetch(&self, _account: Option<Address>) -> Fetched<u64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Fetched::fresh(self.frozen.unwrap_or(n))
        }
    }

    fn counter(frozen: Option<u64>) -> Arc<Counter> {
        Arc::new(Counter {
            calls: AtomicUsize::new(0),
            frozen,
        })
    }

    fn options(interval: Duration) -> PollerOptions {
        PollerOptions {
            interval,
            metrics: None,
        }
    }

    async fn wait_cycles<T>(handle: &PollerHandle<T>, n: u64) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.cycles() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("poller did not reach cycle count");
    }

    #[tokio::test]
    async fn test_unchanged_value_does_not_notify() {
        let store = store(0u64);
        let mut rx = store.subscribe();
        let fetcher = counter(Some(7));

        assert!(run_once(fetcher.as_ref(), &store, None).await.value);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!run_once(fetcher.as_ref(), &store, None).await.value);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), 7);
    }

    #[tokio::test]
    async fn test_fetches_on_start_and_data_changed() {
        let (_session_tx, session_rx) = watch::channel(Session::default());
        let bus = EventBus::default();
        let handle = spawn_poller(
            counter(None),
            store(0u64),
            session_rx,
            &bus,
            options(Duration::from_secs(3600)),
        );

        wait_cycles(&handle, 1).await;
        assert_eq!(*handle.subscribe().borrow(), 1);

        bus.publish(RefreshAction::Purchase);
        wait_cycles(&handle, 2).await;
        assert_eq!(*handle.subscribe().borrow(), 2);
    }

    #[tokio::test]
    async fn test_session_change_triggers_fetch() {
        let (session_tx, session_rx) = watch::channel(Session::default());
        let handle = spawn_poller(
            counter(None),
            store(0u64),
            session_rx,
            &EventBus::default(),
            options(Duration::from_secs(3600)),
        );
        wait_cycles(&handle, 1).await;

        session_tx.send_modify(|s| s.account = Some(Address::repeat_byte(9)));
        wait_cycles(&handle, 2).await;

        session_tx.send_modify(|s| s.generation += 1);
        wait_cycles(&handle, 3).await;

        // Loading flag alone is not a rebind
        session_tx.send_modify(|s| s.is_loading = true);
        handle.refresh();
        wait_cycles(&handle, 4).await;
        assert_eq!(handle.cycles(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_skips_timer_ticks() {
        let (_session_tx, session_rx) = watch::channel(Session::default());
        let handle = spawn_poller(
            counter(None),
            store(0u64),
            session_rx,
            &EventBus::default(),
            options(Duration::from_secs(10)),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(handle.cycles(), 1);

        handle.pause();
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(handle.cycles(), 1);

        handle.refresh();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(handle.cycles(), 2);

        handle.resume();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.cycles() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_uses_floor() {
        let (_session_tx, session_rx) = watch::channel(Session::default());
        let handle = spawn_poller(
            counter(None),
            store(0u64),
            session_rx,
            &EventBus::default(),
            options(Duration::ZERO),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(handle.cycles(), 1);
        assert!(!handle.is_finished());

        tokio::time::sleep(MIN_POLL_INTERVAL).await;
        assert_eq!(handle.cycles(), 2);
    }

    #[tokio::test]
    async fn test_stop_aborts_task() {
        let (_session_tx, session_rx) = watch::channel(Session::default());
        let handle = spawn_poller(
            counter(None),
            store(0u64),
            session_rx,
            &EventBus::default(),
            options(Duration::from_millis(10)),
        );
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
