//! ChronoMint: wallet session, presale and airdrop client for Tempo
//!
//! This crate provides the interaction layer behind the ChronoMint presale,
//! airdrop and dashboard views:
//!
//! - **Session** - connected account, chain id and network-mismatch tracking
//! - **Wallet** - provider boundary (connect, switch/add chain, notifications)
//! - **Ledger** - contract reads/writes, live over JSON-RPC or synthetic
//! - **Fetch** - polled presale, balance and activity stores
//! - **Flows** - presale approve/buy and airdrop eligibility/claim state machines
//! - **Bus** - typed "data changed" broadcast between flows and fetchers
//!
//! ## Usage
//!
//! ```ignore
//! let config = Config::load()?;
//! let app = App::start(&config).await?;
//! let mut flow = app.purchase_flow(status_tx);
//! flow.set_amount("250");
//! flow.submit().await?;
//! ```

pub mod app;
pub mod bus;
pub mod config;
pub mod countdown;
pub mod error;
pub mod fetch;
pub mod flows;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod server;
pub mod session;
pub mod units;
pub mod wallet;

pub use app::App;
pub use bus::{DataChanged, EventBus, RefreshAction};
pub use config::{Config, DataSource};
pub use error::{ClientError, ClientResult};
pub use ledger::{LedgerSource, PendingTx, TokenKind, TxReceipt};
pub use session::{Session, SessionManager, SessionPhase};
pub use units::{format_units, parse_units, NATIVE_DECIMALS, PAYMENT_DECIMALS, REWARD_DECIMALS};
