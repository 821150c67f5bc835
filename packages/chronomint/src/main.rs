//! ChronoMint client
//!
//! Runs the presale/dashboard pollers behind a status server, or performs a
//! single approve, buy, eligibility check or claim from the command line.

use std::sync::Arc;

use chronomint::flows::{ClaimFlow, ClaimStatus, StatusKind, StatusMessage};
use chronomint::server::start_server;
use chronomint::units::format_display;
use chronomint::{App, Config, SessionManager, TxReceipt, REWARD_DECIMALS};
use clap::{Parser, Subcommand};
use eyre::{bail, eyre, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chronomint")]
#[command(about = "ChronoMint presale and airdrop client for Tempo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll presale, balances and activity and serve them over HTTP
    Run,

    /// Print one snapshot of session, presale, balances and activity
    Status,

    /// Approve the presale contract to spend USDC
    Approve {
        /// USDC amount, e.g. "250" or "12.5"
        amount: String,
    },

    /// Buy CHRONO with USDC
    Buy {
        /// USDC amount, e.g. "250" or "12.5"
        amount: String,

        /// Approve first if the allowance does not cover the amount
        #[arg(long)]
        auto_approve: bool,
    },

    /// Check airdrop eligibility
    CheckEligibility {
        /// Confirm the social task is completed
        #[arg(long)]
        task_done: bool,
    },

    /// Claim the airdrop
    Claim {
        /// Confirm the social task is completed
        #[arg(long)]
        task_done: bool,
    },

    /// Switch the wallet to Tempo, adding the network if needed
    SwitchNetwork,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;
    info!(
        rpc = %config.rpc_url,
        data_source = ?config.data_source,
        wallet = config.private_key.is_some(),
        "Configuration loaded"
    );

    let app = App::start(&config).await?;

    let result = match cli.command {
        Commands::Run => run(&app, &config).await,
        Commands::Status => status(&app).await,
        Commands::Approve { amount } => approve(&app, amount).await,
        Commands::Buy {
            amount,
            auto_approve,
        } => buy(&app, amount, auto_approve).await,
        Commands::CheckEligibility { task_done } => {
            let mut flow = app.claim_flow();
            check_eligibility(&app, &mut flow, task_done).await.map(|_| ())
        }
        Commands::Claim { task_done } => claim(&app, task_done).await,
        Commands::SwitchNetwork => switch_network(&app).await,
    };

    app.shutdown();
    result
}

async fn run(app: &App, config: &Config) -> Result<()> {
    let bind = config.health_bind.clone();
    let port = config.health_port;
    let view = app.status_view();
    let server = tokio::spawn(async move {
        if let Err(e) = start_server(&bind, port, view).await {
            error!(error = %e, "Status server failed");
        }
    });

    let mut session = app.subscribe_session();
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    info!("ChronoMint client running");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = session.borrow_and_update().clone();
                if current.is_wrong_network {
                    warn!(chain_id = ?current.chain_id, "Wallet is on the wrong network, run switch-network");
                }
                if let Some(notice) = &current.notice {
                    warn!("{}", notice);
                }
            }
        }
    }

    server.abort();
    info!("ChronoMint client stopped");
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    app.ready().await;
    let view = app.status_view();
    let presale = app.presale().store().borrow().clone();
    let balances = app.balances().store().borrow().clone();
    let activity = app.activity().store().borrow().clone();

    let snapshot = serde_json::json!({
        "session": app.session().snapshot(),
        "ledger": view.ledger,
        "presale": {
            "raised": presale.raised_display(),
            "hard_cap": presale.hard_cap_display(),
            "progress": presale.progress_label(),
            "balance": presale.balance_display(),
            "origin": presale.origin,
        },
        "balances": {
            "native": balances.display(chronomint::TokenKind::Native),
            "reward": balances.display(chronomint::TokenKind::Reward),
            "payment": balances.display(chronomint::TokenKind::Payment),
            "total_value": balances.total_value_display(),
            "origin": balances.origin,
        },
        "activity": activity.records,
        "countdown": chronomint::countdown::time_left(app.presale_end(), chrono::Utc::now())
            .map(|left| left.to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Connect if needed and refuse to write from the wrong network
async fn require_account(session: &Arc<SessionManager>) -> Result<()> {
    if !session.has_provider() {
        bail!("No wallet configured, set WALLET_PRIVATE_KEY");
    }
    if session.account().is_none() && session.connect().await.is_none() {
        let notice = session.snapshot().notice;
        return Err(eyre!(
            "Wallet connection failed{}",
            notice.map(|n| format!(": {}", n)).unwrap_or_default()
        ));
    }
    if session.snapshot().is_wrong_network {
        bail!("Wallet is on the wrong network, run switch-network first");
    }
    Ok(())
}

/// Log flow progress until the sender side is dropped
fn log_status(mut rx: mpsc::UnboundedReceiver<StatusMessage>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message.kind {
                StatusKind::Info | StatusKind::Success => info!("{}", message.message),
                StatusKind::Error => error!("{}", message.message),
            }
        }
    })
}

async fn approve(app: &App, amount: String) -> Result<()> {
    require_account(app.session()).await?;
    app.refresh_presale().await;

    let (tx, rx) = mpsc::unbounded_channel();
    let logger = log_status(rx);
    let mut flow = app.purchase_flow(tx);
    flow.set_amount(amount);

    let result = flow.approve().await;
    drop(flow);
    let _ = logger.await;

    let receipt = result?;
    info!(tx_hash = %receipt.tx_hash, "Approval complete");
    Ok(())
}

async fn buy(app: &App, amount: String, auto_approve: bool) -> Result<()> {
    require_account(app.session()).await?;
    app.refresh_presale().await;

    let (tx, rx) = mpsc::unbounded_channel();
    let logger = log_status(rx);
    let mut flow = app.purchase_flow(tx);
    flow.set_amount(amount);
    info!(
        reward = %format_display(flow.estimated_reward(), REWARD_DECIMALS, 2),
        action = flow.primary_action().label(),
        "Purchase prepared"
    );

    let result: Result<TxReceipt> = async {
        if flow.needs_approval() {
            if !auto_approve {
                bail!("Allowance does not cover the amount, rerun with --auto-approve");
            }
            flow.approve().await?;
        }
        Ok(flow.buy().await?)
    }
    .await;
    drop(flow);
    let _ = logger.await;

    let receipt = result?;
    info!(tx_hash = %receipt.tx_hash, block = ?receipt.block_number, "Purchase complete");
    Ok(())
}

async fn check_eligibility(app: &App, flow: &mut ClaimFlow, task_done: bool) -> Result<ClaimStatus> {
    require_account(app.session()).await?;
    flow.start().await?;
    if !task_done {
        bail!("Complete the social task first, then pass --task-done");
    }
    flow.complete_task()?;

    let status = flow.verify_and_check().await?;
    info!(
        status = ?status,
        amount = %flow.airdrop_amount_display(),
        "Airdrop eligibility"
    );
    Ok(status)
}

async fn claim(app: &App, task_done: bool) -> Result<()> {
    let mut flow = app.claim_flow();
    match check_eligibility(app, &mut flow, task_done).await? {
        ClaimStatus::Eligible => {}
        ClaimStatus::Claimed => {
            info!("Airdrop already claimed");
            return Ok(());
        }
        ClaimStatus::NotEligible => bail!("This account is not eligible for the airdrop"),
        ClaimStatus::Error => bail!("Eligibility could not be determined, try again"),
    }

    match flow.claim().await {
        Ok(receipt) => {
            info!(
                tx_hash = %receipt.tx_hash,
                amount = %flow.airdrop_amount_display(),
                "Airdrop claimed"
            );
            Ok(())
        }
        Err(e) => {
            let message = flow.error_message().unwrap_or("Claim failed").to_string();
            Err(eyre::Report::new(e).wrap_err(message))
        }
    }
}

async fn switch_network(app: &App) -> Result<()> {
    let session = app.session();
    if !session.has_provider() {
        bail!("No wallet configured, set WALLET_PRIVATE_KEY");
    }
    session.switch_network().await;
    let snapshot = session.snapshot();
    if snapshot.is_wrong_network {
        bail!("Still on chain {:?}", snapshot.chain_id);
    }
    info!(chain_id = ?snapshot.chain_id, "Wallet on Tempo");
    Ok(())
}

/// `RUST_LOG` wins unless `--verbose` is given
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = match (verbose, EnvFilter::try_from_default_env()) {
        (true, _) => EnvFilter::new("debug"),
        (false, Ok(filter)) => filter,
        (false, Err(_)) => EnvFilter::new("info,chronomint=debug"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "SIGINT", "Shutting down"),
        Err(e) => {
            error!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where available
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => info!(signal = "SIGTERM", "Shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable, Ctrl-C only"),
        }
    }
    ctrl_c().await;
}
