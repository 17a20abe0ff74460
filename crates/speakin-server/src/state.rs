use std::sync::Arc;

use axum::extract::FromRef;

use speakin_booking::SettlementOrchestrator;
use speakin_escrow::{EscrowService, InMemoryEscrowStore, PurchaseSettlement};
use speakin_ledger::{BalanceReader, BalanceWriter};

use crate::auth::AuthProvider;

/// Read and write access to balances.
pub trait LedgerStore: BalanceReader + BalanceWriter {}

impl<T: BalanceReader + BalanceWriter> LedgerStore for T {}

#[derive(Clone)]
pub struct LedgerState {
    pub ledger: Arc<dyn LedgerStore>,
}

#[derive(Clone)]
pub struct EscrowState {
    pub service: Arc<EscrowService<InMemoryEscrowStore>>,
    pub purchases: Arc<PurchaseSettlement>,
}

#[derive(Clone)]
pub struct BookingState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub auth: Arc<dyn AuthProvider>,
}

impl FromRef<BookingState> for Arc<dyn AuthProvider> {
    fn from_ref(state: &BookingState) -> Self {
        state.auth.clone()
    }
}
