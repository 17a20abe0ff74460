use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use speakin_booking::{
    InMemoryBookingRepository, LogPublisher, NotificationPublisher, Notifier, SettlementOrchestrator,
    WebhookPublisher,
};
use speakin_client::{HttpEscrowClient, HttpLedgerClient};
use speakin_escrow::{EscrowService, InMemoryEscrowStore, LocalEscrow, PurchaseSettlement};
use speakin_ledger::{BalanceWriter, InMemoryBalanceLedger, LocalLedger};
use speakin_protocol::{EscrowRpc, LedgerRpc};
use speakin_saga::FileSagaLog;
use speakin_types::{Clock, SystemClock};

use crate::auth::StaticTokenAuth;
use crate::config::{SinkKind, SpeakinConfig};
use crate::error::{ServerError, ServerResult};
use crate::router::{build_booking_router, build_escrow_router, build_ledger_router};
use crate::state::{BookingState, EscrowState, LedgerState};

/// Which service a process runs. `All` hosts the three in one process and
/// wires them together without HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceKind {
    Ledger,
    Escrow,
    Booking,
    All,
}

/// Speakin settlement services.
pub struct SpeakinServer {
    config: SpeakinConfig,
    clock: Arc<dyn Clock>,
}

impl SpeakinServer {
    pub fn new(config: SpeakinConfig) -> Self {
        Self { config, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SpeakinConfig {
        &self.config
    }

    /// In-memory ledger opened with the configured seed accounts.
    pub fn ledger_state(&self) -> ServerResult<LedgerState> {
        let ledger = InMemoryBalanceLedger::new();
        for seed in &self.config.ledger.accounts {
            ledger.open_account(seed.account_id, seed.balance_credits)?;
        }
        Ok(LedgerState { ledger: Arc::new(ledger) })
    }

    pub fn escrow_state(&self, ledger: Arc<dyn LedgerRpc>) -> EscrowState {
        let timeout = self.config.escrow.ledger.timeout();
        let service = EscrowService::new(
            Arc::new(InMemoryEscrowStore::new()),
            ledger.clone(),
            self.config.escrow.payout.clone(),
            self.clock.clone(),
        )
        .with_ledger_timeout(timeout);
        EscrowState {
            service: Arc::new(service),
            purchases: Arc::new(PurchaseSettlement::new(ledger, self.clock.clone(), timeout)),
        }
    }

    /// Opens the saga log and starts the notification worker.
    pub fn booking_state(
        &self,
        ledger: Arc<dyn LedgerRpc>,
        escrow: Arc<dyn EscrowRpc>,
    ) -> ServerResult<(BookingState, JoinHandle<()>)> {
        let booking = &self.config.booking;
        if let Some(parent) = booking.saga_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let sagas = FileSagaLog::open(&booking.saga_log, booking.wal_config())?;

        let (notifier, worker) = Notifier::spawn(self.publisher()?, self.config.notifications.retry());
        let orchestrator = SettlementOrchestrator::new(
            Arc::new(InMemoryBookingRepository::new()),
            ledger,
            escrow,
            Arc::new(sagas),
            self.clock.clone(),
        )
        .with_policy(booking.policy.clone())
        .with_notifier(notifier);

        let auth = StaticTokenAuth::new(&self.config.auth);
        if auth.is_empty() {
            warn!("no auth tokens configured; session endpoints will reject every request");
        }
        let state = BookingState { orchestrator: Arc::new(orchestrator), auth: Arc::new(auth) };
        Ok((state, worker))
    }

    fn publisher(&self) -> ServerResult<Arc<dyn NotificationPublisher>> {
        let notifications = &self.config.notifications;
        match (notifications.sink, &notifications.webhook_url) {
            (SinkKind::Webhook, Some(url)) => {
                let webhook = WebhookPublisher::new(url.clone(), notifications.timeout())
                    .map_err(|e| ServerError::Config(format!("notifications webhook: {e}")))?;
                Ok(Arc::new(webhook))
            }
            (SinkKind::Webhook, None) => {
                Err(ServerError::Config("notifications.webhook_url is required for the webhook sink".into()))
            }
            (SinkKind::Log, _) => Ok(Arc::new(LogPublisher)),
        }
    }

    /// Start serving until the process is interrupted.
    pub async fn serve(self, kind: ServiceKind) -> ServerResult<()> {
        match kind {
            ServiceKind::Ledger => {
                let router = build_ledger_router(self.ledger_state()?);
                serve_router("ledger", self.config.ledger.bind_addr, router).await
            }
            ServiceKind::Escrow => {
                let ledger = HttpLedgerClient::new(&self.config.escrow.ledger)?;
                let router = build_escrow_router(self.escrow_state(Arc::new(ledger)));
                serve_router("escrow", self.config.escrow.bind_addr, router).await
            }
            ServiceKind::Booking => {
                let ledger = HttpLedgerClient::new(&self.config.booking.ledger)?;
                let escrow = HttpEscrowClient::new(&self.config.booking.escrow)?;
                let (state, _worker) = self.booking_state(Arc::new(ledger), Arc::new(escrow))?;
                self.recover_on_start(&state).await?;
                serve_router("booking", self.config.booking.bind_addr, build_booking_router(state)).await
            }
            ServiceKind::All => {
                let ledger_state = self.ledger_state()?;
                let ledger_rpc: Arc<dyn LedgerRpc> = Arc::new(LocalLedger::new(ledger_state.ledger.clone()));
                let escrow_state = self.escrow_state(ledger_rpc.clone());
                let escrow_rpc: Arc<dyn EscrowRpc> = Arc::new(LocalEscrow::new(escrow_state.service.clone()));
                let (booking_state, _worker) = self.booking_state(ledger_rpc, escrow_rpc)?;
                self.recover_on_start(&booking_state).await?;

                tokio::try_join!(
                    serve_router("ledger", self.config.ledger.bind_addr, build_ledger_router(ledger_state)),
                    serve_router("escrow", self.config.escrow.bind_addr, build_escrow_router(escrow_state)),
                    serve_router("booking", self.config.booking.bind_addr, build_booking_router(booking_state)),
                )?;
                Ok(())
            }
        }
    }

    async fn recover_on_start(&self, state: &BookingState) -> ServerResult<()> {
        if !self.config.booking.recover_on_start {
            return Ok(());
        }
        let report = state.orchestrator.recover().await?;
        for (saga, error) in &report.failed {
            warn!(%saga, %error, "saga left open after startup recovery");
        }
        Ok(())
    }
}

async fn serve_router(service: &'static str, addr: SocketAddr, router: Router) -> ServerResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(service, %addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
