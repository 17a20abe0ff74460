use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use speakin_protocol::{
    call_with_deadline, AdjustBalanceRequest, EscrowResponse, LedgerRpc, LockCreditsRequest,
    ReleaseLockedCreditsRequest,
};
use speakin_types::{AccountId, BookingId, Clock, EscrowRecord, EscrowStatus, PayoutPolicy};

use crate::error::{EscrowError, EscrowResult};
use crate::store::EscrowStore;

const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(10);

/// Payment-service logic over an [`EscrowStore`].
///
/// Releasing escrow pays the tutor through the account service's ledger.
pub struct EscrowService<S> {
    store: Arc<S>,
    ledger: Arc<dyn LedgerRpc>,
    policy: PayoutPolicy,
    clock: Arc<dyn Clock>,
    ledger_timeout: Duration,
}

impl<S: EscrowStore> EscrowService<S> {
    pub fn new(
        store: Arc<S>,
        ledger: Arc<dyn LedgerRpc>,
        policy: PayoutPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            policy,
            clock,
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> &PayoutPolicy {
        &self.policy
    }

    /// Hold credits for a booking. Does not check the student's balance;
    /// the booking service deducts before locking.
    pub async fn lock(&self, request: &LockCreditsRequest) -> EscrowResult<EscrowResponse> {
        if request.credits_required == 0 {
            return Err(EscrowError::InvalidRequest(
                "credits_required must be positive".into(),
            ));
        }
        if request.student_id == request.tutor_id {
            return Err(EscrowError::InvalidRequest(
                "student and tutor must differ".into(),
            ));
        }

        let record = EscrowRecord::locked(
            request.booking_id,
            request.student_id,
            request.tutor_id,
            request.credits_required,
            self.clock.now(),
        );
        let outcome = self.store.insert_locked(record)?;
        if outcome.created {
            info!(
                booking = %request.booking_id.short_id(),
                student = %request.student_id.short_id(),
                tutor = %request.tutor_id.short_id(),
                credits = request.credits_required,
                "credits locked"
            );
        }
        Ok(EscrowResponse::ok(outcome.record))
    }

    /// Move a locked record to `refunded`. Crediting the student is the
    /// caller's job. A second refund finds nothing locked and fails.
    pub async fn refund(&self, booking: BookingId) -> EscrowResult<EscrowResponse> {
        let record = self
            .store
            .transition(booking, EscrowStatus::Locked, EscrowStatus::Refunded, self.clock.now())
            .map_err(|err| match err {
                EscrowError::NotFound(_) | EscrowError::StatusMismatch { .. } => {
                    EscrowError::NotLocked(booking)
                }
                other => other,
            })?;
        info!(booking = %booking.short_id(), credits = record.credits_locked, "escrow refunded");
        Ok(EscrowResponse::ok(record))
    }

    /// Move a locked record to `released` and pay the tutor their share.
    ///
    /// `released` is final. The payout is keyed per booking, so a repeated
    /// release re-sends it and the ledger replays instead of crediting twice.
    /// Success is only reported once the ledger has confirmed the payout.
    pub async fn release(&self, request: &ReleaseLockedCreditsRequest) -> EscrowResult<EscrowResponse> {
        let booking = request.booking_id;
        let current = self.store.get(booking)?.ok_or(EscrowError::NotLocked(booking))?;
        match current.status {
            EscrowStatus::Released => return self.confirm_payout(request, current).await,
            EscrowStatus::Refunded => return Err(EscrowError::NotLocked(booking)),
            EscrowStatus::Locked => {}
        }

        let released = match self.store.transition(
            booking,
            EscrowStatus::Locked,
            EscrowStatus::Released,
            self.clock.now(),
        ) {
            Ok(record) => record,
            Err(EscrowError::StatusMismatch {
                actual: EscrowStatus::Released,
                ..
            }) => {
                let record = self.store.get(booking)?.ok_or(EscrowError::NotFound(booking))?;
                return self.confirm_payout(request, record).await;
            }
            Err(EscrowError::StatusMismatch { .. }) => return Err(EscrowError::NotLocked(booking)),
            Err(other) => return Err(other),
        };

        let payout = self.pay_tutor(request, &released).await?;
        info!(
            booking = %booking.short_id(),
            tutor = %released.tutor_id.short_id(),
            session_type = %request.session_type,
            credits = released.credits_locked,
            payout,
            fee = released.credits_locked - payout,
            "escrow released"
        );
        Ok(EscrowResponse::released(released, payout))
    }

    /// Repeat path for a record some earlier call already moved to
    /// `released`. That call's payout may still be in flight or may have
    /// failed, so it is sent again under the same key.
    async fn confirm_payout(
        &self,
        request: &ReleaseLockedCreditsRequest,
        record: EscrowRecord,
    ) -> EscrowResult<EscrowResponse> {
        let payout = self.pay_tutor(request, &record).await?;
        debug!(booking = %record.booking_id.short_id(), payout, "release repeated; payout confirmed");
        Ok(EscrowResponse::ok(record))
    }

    async fn pay_tutor(
        &self,
        request: &ReleaseLockedCreditsRequest,
        record: &EscrowRecord,
    ) -> EscrowResult<u64> {
        let payout = self.policy.payout(request.session_type, record.credits_locked);
        if payout == 0 {
            return Ok(0);
        }
        self.credit_tutor(record, payout).await.map_err(|source| {
            warn!(
                booking = %record.booking_id.short_id(),
                error = %source,
                "tutor payout failed; escrow stays released until a retry confirms it"
            );
            EscrowError::Payout { booking: record.booking_id, source }
        })?;
        Ok(payout)
    }

    pub fn get(&self, booking: BookingId) -> EscrowResult<EscrowRecord> {
        self.store.get(booking)?.ok_or(EscrowError::NotFound(booking))
    }

    pub fn list(&self, account: AccountId) -> EscrowResult<Vec<EscrowRecord>> {
        self.store.list_for_account(account)
    }

    async fn credit_tutor(
        &self,
        record: &EscrowRecord,
        payout: u64,
    ) -> Result<(), speakin_protocol::RpcError> {
        let request = AdjustBalanceRequest::credit_add(record.tutor_id, payout)
            .with_key(format!("escrow:{}:payout", record.booking_id));
        call_with_deadline(
            "adjust_balance",
            self.ledger_timeout,
            self.ledger.adjust_balance(request),
        )
        .await
        .map(|_| ())
    }
}
