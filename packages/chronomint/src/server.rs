//! HTTP server for health, metrics and client state

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::eyre;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::countdown::{time_left, TimeLeft};
use crate::fetch::{ActivityFeed, DashboardBalances, DataOrigin, PresaleState};
use crate::ledger::TokenKind;
use crate::metrics::{Metrics, METRICS_CONTENT_TYPE};
use crate::session::Session;

/// Read-only view of the client stores
#[derive(Clone)]
pub struct StatusView {
    pub session: watch::Receiver<Session>,
    pub presale: watch::Receiver<PresaleState>,
    pub balances: watch::Receiver<DashboardBalances>,
    pub activity: watch::Receiver<ActivityFeed>,
    /// Completed presale fetch cycles
    pub presale_cycles: watch::Receiver<u64>,
    pub presale_end: DateTime<Utc>,
    pub ledger: &'static str,
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ledger: String,
    pub session: Session,
    pub presale_origin: DataOrigin,
    pub balances_origin: DataOrigin,
    pub activity_origin: DataOrigin,
}

#[derive(Serialize)]
pub struct PresaleView {
    pub raised: String,
    pub hard_cap: String,
    pub progress: String,
    pub rate: String,
    pub balance: String,
    pub allowance: String,
    pub contribution: String,
    pub origin: DataOrigin,
}

impl From<&PresaleState> for PresaleView {
    fn from(state: &PresaleState) -> Self {
        use crate::units::{format_display, PAYMENT_DECIMALS};

        Self {
            raised: state.raised_display(),
            hard_cap: state.hard_cap_display(),
            progress: state.progress_label(),
            rate: state.rate.to_string(),
            balance: state.balance_display(),
            allowance: format_display(state.user_allowance, PAYMENT_DECIMALS, 2),
            contribution: format_display(state.contribution, PAYMENT_DECIMALS, 2),
            origin: state.origin,
        }
    }
}

#[derive(Serialize)]
pub struct BalancesView {
    pub native: String,
    pub reward: String,
    pub payment: String,
    pub total_value: String,
    pub origin: DataOrigin,
}

impl From<&DashboardBalances> for BalancesView {
    fn from(balances: &DashboardBalances) -> Self {
        Self {
            native: balances.display(TokenKind::Native),
            reward: balances.display(TokenKind::Reward),
            payment: balances.display(TokenKind::Payment),
            total_value: balances.total_value_display(),
            origin: balances.origin,
        }
    }
}

#[derive(Serialize)]
pub struct StateResponse {
    pub session: Session,
    pub presale: PresaleView,
    pub balances: BalancesView,
    pub activity: ActivityFeed,
    /// Absent once the presale has ended
    pub countdown: Option<TimeLeft>,
}

/// Health check endpoint handler
async fn health_check(State(view): State<StatusView>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ledger: view.ledger.to_string(),
        session: view.session.borrow().clone(),
        presale_origin: view.presale.borrow().origin,
        balances_origin: view.balances.borrow().origin,
        activity_origin: view.activity.borrow().origin,
    })
}

/// Liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check: the presale poller has completed a cycle
async fn readiness(State(view): State<StatusView>) -> &'static str {
    if *view.presale_cycles.borrow() > 0 {
        "OK"
    } else {
        "NOT_READY"
    }
}

async fn client_state(State(view): State<StatusView>) -> Json<StateResponse> {
    let session = view.session.borrow().clone();
    let presale = PresaleView::from(&*view.presale.borrow());
    let balances = BalancesView::from(&*view.balances.borrow());
    let activity = view.activity.borrow().clone();

    Json(StateResponse {
        session,
        presale,
        balances,
        activity,
        countdown: time_left(view.presale_end, Utc::now()),
    })
}

/// Prometheus metrics endpoint
async fn prometheus_metrics(State(view): State<StatusView>) -> Response {
    view.metrics.observe_session(&view.session.borrow());
    view.metrics.observe_block(view.activity.borrow().latest_block);

    match view.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

pub fn router(view: StatusView) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/state", get(client_state))
        .with_state(view)
}

/// Start the HTTP server for health, metrics and state
pub async fn start_server(bind_address: &str, port: u16, view: StatusView) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Status server listening on {}", addr);
    info!("  /health  - Session and data origin (JSON)");
    info!("  /state   - Presale, balances and activity (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(view)).await?;

    Ok(())
}
