use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use speakin_protocol::{
    call_with_deadline, AdjustBalanceRequest, EscrowRpc, LedgerRpc, LockCreditsRequest,
    RefundLockedCreditsRequest, ReleaseLockedCreditsRequest, RpcError,
};
use speakin_saga::{
    SagaId, SagaJournal, SagaKind, SagaLog, SagaPlan, SagaProgress, SagaRecord, SagaStep,
    Settlement,
};
use speakin_types::{
    AccountId, BookingId, BookingStatus, Clock, Credits, EscrowStatus, Party, RoomName, SlotId,
};

use crate::attendance::{Attendance, JoinWindow, Resolution};
use crate::error::{BookingError, BookingResult};
use crate::locks::{KeyedLocks, LockKey};
use crate::model::{AvailabilitySlot, Booking, BookingFilter, BookingRequest, BookingUpdate, NewSlot};
use crate::notify::{Notification, Notifier};
use crate::policy::BookingPolicy;
use crate::repo::BookingRepository;
use crate::rules::{BookingCandidate, RulePipeline, SlotCandidate};

/// Idempotency keys sent to the ledger. Stable per booking so a retried or
/// recovered step never applies twice.
pub(crate) mod keys {
    use speakin_saga::SagaId;
    use speakin_types::BookingId;

    pub fn deduct(booking: BookingId) -> String {
        format!("booking:{booking}:deduct")
    }

    pub fn undo_deduct(booking: BookingId) -> String {
        format!("booking:{booking}:deduct:undo")
    }

    /// Student credit after a cancel or settle refund.
    pub fn refund(saga: SagaId) -> String {
        format!("booking:{}:{}:refund", saga.booking_id, saga.kind)
    }
}

/// Sequences every booking transition across the local repository, the
/// balance ledger and the escrow store.
///
/// Remote steps run strictly in order with a deadline each. The plan of
/// each sequence and every confirmed remote step go to the saga log, which
/// is what [`SettlementOrchestrator::recover`] replays after a crash.
pub struct SettlementOrchestrator {
    pub(crate) repo: Arc<dyn BookingRepository>,
    pub(crate) ledger: Arc<dyn LedgerRpc>,
    pub(crate) escrow: Arc<dyn EscrowRpc>,
    pub(crate) sagas: Arc<dyn SagaLog>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Notifier,
    pub(crate) policy: BookingPolicy,
    booking_rules: RulePipeline<BookingCandidate>,
    slot_rules: RulePipeline<SlotCandidate>,
    pub(crate) locks: KeyedLocks<LockKey>,
}

impl SettlementOrchestrator {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        ledger: Arc<dyn LedgerRpc>,
        escrow: Arc<dyn EscrowRpc>,
        sagas: Arc<dyn SagaLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            ledger,
            escrow,
            sagas,
            clock,
            notifier: Notifier::disabled(),
            policy: BookingPolicy::default(),
            booking_rules: RulePipeline::booking_rules(),
            slot_rules: RulePipeline::slot_rules(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn repo(&self) -> &Arc<dyn BookingRepository> {
        &self.repo
    }

    fn timeout(&self) -> Duration {
        self.policy.rpc_timeout()
    }

    pub(crate) fn record(&self, saga: SagaId, step: SagaStep) -> BookingResult<()> {
        debug!(saga = %saga, step = %step, "saga step");
        self.sagas.append(&SagaRecord::new(saga, step, self.clock.now()))?;
        Ok(())
    }

    // -- slots ------------------------------------------------------------

    pub async fn create_slot(&self, new: NewSlot) -> BookingResult<AvailabilitySlot> {
        let _tutor = self.locks.lock(LockKey::Tutor(new.tutor_id)).await;
        let mut tutor_slots = Vec::new();
        for slot in self.repo.slots(Some(new.tutor_id))? {
            let held = self
                .repo
                .bookings(&BookingFilter::slot(slot.id))?
                .iter()
                .any(|b| b.booking_status.is_active());
            tutor_slots.push((slot, held));
        }
        self.slot_rules.check(&SlotCandidate { new: new.clone(), tutor_slots })?;

        let slot = self.repo.insert_slot(new, self.clock.now())?;
        info!(slot = %slot.id.short_id(), tutor = %slot.tutor_id.short_id(), session_type = %slot.session_type, "slot created");
        Ok(slot)
    }

    pub async fn remove_slot(&self, id: SlotId) -> BookingResult<AvailabilitySlot> {
        let _slot = self.locks.lock(LockKey::Slot(id)).await;
        let slot = self.repo.remove_slot(id)?;
        info!(slot = %id.short_id(), "slot removed");
        Ok(slot)
    }

    pub fn get_slot(&self, id: SlotId) -> BookingResult<AvailabilitySlot> {
        self.repo
            .slot(id)?
            .ok_or_else(|| BookingError::NotFound(format!("slot {id}")))
    }

    pub fn list_slots(&self, tutor: Option<AccountId>) -> BookingResult<Vec<AvailabilitySlot>> {
        self.repo.slots(tutor)
    }

    // -- reads ------------------------------------------------------------

    pub fn get_booking(&self, id: BookingId) -> BookingResult<Booking> {
        self.repo
            .booking(id)?
            .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))
    }

    pub fn list_bookings(&self, filter: &BookingFilter) -> BookingResult<Vec<Booking>> {
        self.repo.bookings(filter)
    }

    /// Bookings on any of the tutor's slots.
    pub fn list_tutor_bookings(&self, tutor: AccountId) -> BookingResult<Vec<Booking>> {
        let mut bookings = Vec::new();
        for slot in self.repo.slots(Some(tutor))? {
            bookings.extend(self.repo.bookings(&BookingFilter::slot(slot.id))?);
        }
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(bookings)
    }

    // -- creation ---------------------------------------------------------

    /// Check balance, deduct, lock escrow, then confirm locally.
    pub async fn create_booking(&self, request: BookingRequest) -> BookingResult<Booking> {
        let student = request.student_id;
        let _student = self.locks.lock(LockKey::Student(student)).await;
        let _slot = self.locks.lock(LockKey::Slot(request.availability_id)).await;

        let now = self.clock.now();
        let slot = self.get_slot(request.availability_id)?;
        let candidate = self.candidate(&slot, student, now)?;
        self.booking_rules.check(&candidate)?;

        let credits = slot.credits_required;
        let available = self.balance_of(student).await?;
        if available < credits {
            return Err(BookingError::InsufficientCredits { required: credits, available });
        }

        let booking_id = self.repo.next_booking_id()?;
        let _booking = self.locks.lock(LockKey::Booking(booking_id)).await;
        let saga = SagaId::new(booking_id, SagaKind::Create);
        self.record(
            saga,
            SagaStep::Begun(SagaPlan::Create {
                slot_id: slot.id,
                student_id: student,
                tutor_id: slot.tutor_id,
                session_type: slot.session_type,
                credits,
            }),
        )?;

        let deduct = AdjustBalanceRequest::deduct(student, credits).with_key(keys::deduct(booking_id));
        match call_with_deadline("adjust_balance", self.timeout(), self.ledger.adjust_balance(deduct)).await {
            Ok(response) => {
                debug!(booking = %booking_id.short_id(), balance = response.balance_credits, "balance deducted");
                self.record(saga, SagaStep::BalanceDeducted)?;
            }
            Err(e) if is_definitive(&e) => {
                self.record(saga, SagaStep::Aborted { reason: e.to_string() })?;
                if e.is_insufficient_credits() {
                    // The balance moved between the check and the deduct.
                    let available = match self.balance_of(student).await {
                        Ok(balance) => balance,
                        Err(reread) => {
                            warn!(
                                booking = %booking_id.short_id(),
                                student = %student.short_id(),
                                error = %reread,
                                "balance re-read failed after rejected deduct; reporting zero available"
                            );
                            0
                        }
                    };
                    return Err(BookingError::InsufficientCredits { required: credits, available });
                }
                return Err(BookingError::remote("deduct_balance", e));
            }
            Err(e) => {
                let cause = BookingError::remote("deduct_balance", e);
                return Err(self.undo_create(saga, student, credits, cause).await);
            }
        }

        let lock = LockCreditsRequest {
            student_id: student,
            tutor_id: slot.tutor_id,
            booking_id,
            credits_required: credits,
        };
        if let Err(e) = call_with_deadline("lock_credits", self.timeout(), self.escrow.lock_credits(lock)).await {
            let cause = BookingError::remote("lock_credits", e);
            return Err(self.undo_create(saga, student, credits, cause).await);
        }
        self.record(saga, SagaStep::EscrowLocked)?;

        let room = RoomName::generate(booking_id, slot.tutor_id, student);
        let link = room.link(&self.policy.video_base_url);
        let booking = Booking::confirmed(booking_id, &slot, student, room, link, now);
        let booking = match self.repo.confirm_booking(booking) {
            Ok(booking) => booking,
            Err(cause) => return Err(self.undo_create(saga, student, credits, cause).await),
        };
        self.record(saga, SagaStep::Committed)?;

        info!(
            booking = %booking_id.short_id(),
            slot = %slot.id.short_id(),
            student = %student.short_id(),
            credits,
            "booking confirmed"
        );
        self.notifier.publish(Notification::confirmed(&booking, &slot, now));
        Ok(booking)
    }

    async fn balance_of(&self, account: AccountId) -> BookingResult<Credits> {
        match call_with_deadline("get_balance", self.timeout(), self.ledger.get_balance(account)).await {
            Ok(balance) => Ok(balance.balance_credits),
            Err(e) if e.is_not_found() => Err(BookingError::NotFound(format!("account {account}"))),
            Err(e) => Err(BookingError::remote("get_balance", e)),
        }
    }

    fn candidate(&self, slot: &AvailabilitySlot, student: AccountId, now: DateTime<Utc>) -> BookingResult<BookingCandidate> {
        let mut history = Vec::new();
        for booking in self.repo.bookings(&BookingFilter::student(student))? {
            if let Some(booked) = self.repo.slot(booking.availability_id)? {
                history.push((booking, booked));
            }
        }
        Ok(BookingCandidate {
            slot: slot.clone(),
            student_id: student,
            now,
            history,
        })
    }

    /// Compensate a failed creation and pick the error to report.
    async fn undo_create(&self, saga: SagaId, student: AccountId, credits: Credits, cause: BookingError) -> BookingError {
        warn!(saga = %saga, error = %cause, "booking creation failed; compensating");
        match self.compensate_create(saga, student, credits, None, &cause.to_string()).await {
            Ok(()) => cause,
            Err(BookingError::Remote { operation, source }) => {
                error!(saga = %saga, operation, error = %source, "compensation failed; left for recovery");
                BookingError::CompensationFailed {
                    operation,
                    cause: cause.to_string(),
                    source,
                }
            }
            Err(other) => {
                error!(saga = %saga, error = %other, "compensation failed; left for recovery");
                other
            }
        }
    }

    /// Refund the escrow lock if any, then reverse the deduction if it was
    /// applied. Steps already recorded in `progress` are skipped.
    pub(crate) async fn compensate_create(
        &self,
        saga: SagaId,
        student: AccountId,
        credits: Credits,
        progress: Option<&SagaProgress>,
        reason: &str,
    ) -> BookingResult<()> {
        let done = |step: &SagaStep| progress.map_or(false, |p| p.has(step));
        if !progress.map_or(false, SagaProgress::is_compensating) {
            self.record(saga, SagaStep::Compensating { reason: reason.to_string() })?;
        }

        if !done(&SagaStep::LockReverted) {
            let refund = RefundLockedCreditsRequest { booking_id: saga.booking_id };
            match call_with_deadline("refund_locked_credits", self.timeout(), self.escrow.refund_locked_credits(refund)).await {
                Ok(_) => debug!(saga = %saga, "escrow lock refunded"),
                Err(e) if e.is_not_found() => debug!(saga = %saga, "no escrow lock to refund"),
                Err(e) => return Err(BookingError::remote("refund_locked_credits", e)),
            }
            self.record(saga, SagaStep::LockReverted)?;
        }

        if !done(&SagaStep::DeductionReversed) {
            // Re-sending the deduct under its key settles whether it was
            // applied: a replay means it was, a fresh apply is undone below,
            // a definitive refusal means there is nothing to undo.
            let deduct = AdjustBalanceRequest::deduct(student, credits).with_key(keys::deduct(saga.booking_id));
            match call_with_deadline("adjust_balance", self.timeout(), self.ledger.adjust_balance(deduct)).await {
                Ok(_) => {
                    let undo = AdjustBalanceRequest::credit_add(student, credits)
                        .with_key(keys::undo_deduct(saga.booking_id));
                    call_with_deadline("adjust_balance", self.timeout(), self.ledger.adjust_balance(undo))
                        .await
                        .map_err(|e| BookingError::remote("credit_balance", e))?;
                }
                Err(e) if is_definitive(&e) => {
                    debug!(saga = %saga, error = %e, "deduction was never applied");
                }
                Err(e) => return Err(BookingError::remote("deduct_balance", e)),
            }
            self.record(saga, SagaStep::DeductionReversed)?;
        }

        self.record(saga, SagaStep::Compensated)?;
        info!(saga = %saga, "booking creation compensated");
        Ok(())
    }

    // -- cancellation -----------------------------------------------------

    /// Refund the escrow, credit the student, then mark the booking
    /// canceled by `initiator`.
    pub async fn cancel_booking(&self, id: BookingId, initiator: Party) -> BookingResult<Booking> {
        let _booking = self.locks.lock(LockKey::Booking(id)).await;
        let booking = self.get_booking(id)?;
        if booking.booking_status.is_canceled() {
            return Err(BookingError::Conflict(format!("booking {id} is already canceled")));
        }
        if booking.booking_status != BookingStatus::Confirmed {
            return Err(BookingError::Conflict(format!(
                "booking {id} is {}; only confirmed bookings can be canceled",
                booking.booking_status
            )));
        }
        let slot = self.get_slot(booking.availability_id)?;
        let now = self.clock.now();
        let reopen_slot = initiator == Party::Student
            && slot.start_time - now >= self.policy.cancellation_cutoff();

        let plan = SagaPlan::Terminate {
            slot_id: slot.id,
            student_id: booking.student_id,
            target: BookingStatus::canceled_by(initiator),
            settlement: Settlement::Refund { credit: slot.credits_required },
            reopen_slot,
            decided_at: now,
        };
        let saga = SagaId::new(id, SagaKind::Cancel);
        let (plan, progress) = self.begin_or_resume(saga, plan)?;
        self.finish_termination(saga, &plan, progress.as_ref(), booking, &slot).await
    }

    /// Cancel the confirmed booking on a slot.
    pub async fn cancel_slot_booking(&self, slot_id: SlotId, initiator: Party) -> BookingResult<Booking> {
        let bookings = self.repo.bookings(&BookingFilter::slot(slot_id))?;
        if let Some(confirmed) = bookings.iter().find(|b| b.booking_status == BookingStatus::Confirmed) {
            return self.cancel_booking(confirmed.id, initiator).await;
        }
        match bookings.last() {
            Some(latest) if latest.booking_status.is_canceled() => Err(BookingError::Conflict(format!(
                "booking on slot {slot_id} is already canceled"
            ))),
            _ => Err(BookingError::NotFound(format!("confirmed booking on slot {slot_id}"))),
        }
    }

    // -- updates and completion -------------------------------------------

    /// Record join times and apply a status change. `completed` settles the
    /// escrow according to who joined on time.
    pub async fn update_booking(&self, id: BookingId, update: BookingUpdate) -> BookingResult<Booking> {
        let _booking = self.locks.lock(LockKey::Booking(id)).await;
        let mut booking = self.get_booking(id)?;
        let from = booking.booking_status;
        if from.is_terminal() {
            return Err(BookingError::Conflict(format!("booking {id} is already {from}")));
        }
        if let Some(to) = update.booking_status {
            if !matches!(to, BookingStatus::Ongoing | BookingStatus::Completed) {
                return Err(BookingError::InvalidTransition { from, to });
            }
        }

        let slot = self.get_slot(booking.availability_id)?;
        let now = self.clock.now();
        let window = JoinWindow::new(self.policy.join_window());
        let mut changed = false;
        if let Some(at) = update.student_joined_at {
            booking.student_joined_at = Some(at);
            booking.student_joined_within_5min |= window.contains(slot.start_time, at);
            changed = true;
        }
        if let Some(at) = update.tutor_joined_at {
            booking.tutor_joined_at = Some(at);
            booking.tutor_joined_within_5min |= window.contains(slot.start_time, at);
            changed = true;
        }
        if update.booking_status == Some(BookingStatus::Ongoing) && from == BookingStatus::Confirmed {
            booking.booking_status = BookingStatus::Ongoing;
            changed = true;
        }
        if changed {
            booking.updated_at = now;
            self.repo.save_booking(&booking, None)?;
        }

        if update.booking_status != Some(BookingStatus::Completed) {
            return Ok(booking);
        }

        let attendance = Attendance::from_flags(booking.student_joined_within_5min, booking.tutor_joined_within_5min);
        let resolution = Resolution::resolve(attendance, slot.session_type, slot.credits_required, &self.policy);
        info!(booking = %id.short_id(), ?attendance, status = %resolution.status, "resolving session");
        let plan = SagaPlan::Terminate {
            slot_id: slot.id,
            student_id: booking.student_id,
            target: resolution.status,
            settlement: resolution.settlement,
            reopen_slot: false,
            decided_at: now,
        };
        let saga = SagaId::new(id, SagaKind::Settle);
        let (plan, progress) = self.begin_or_resume(saga, plan)?;
        self.finish_termination(saga, &plan, progress.as_ref(), booking, &slot).await
    }

    // -- termination saga -------------------------------------------------

    /// Resume the open saga `saga` with its stored plan, or record `fresh`
    /// as a new attempt. Refuses while the other termination kind is open.
    fn begin_or_resume(&self, saga: SagaId, fresh: SagaPlan) -> BookingResult<(SagaPlan, Option<SagaProgress>)> {
        let other = match saga.kind {
            SagaKind::Cancel => SagaKind::Settle,
            _ => SagaKind::Cancel,
        };
        let other_id = SagaId::new(saga.booking_id, other);
        if SagaJournal::find(self.sagas.as_ref(), other_id)?.is_some_and(|p| p.is_open()) {
            return Err(BookingError::Conflict(format!(
                "booking {} has an unfinished {other}",
                saga.booking_id
            )));
        }

        if let Some(progress) = SagaJournal::find(self.sagas.as_ref(), saga)?.filter(SagaProgress::is_open) {
            if let Some(plan) = progress.plan.clone() {
                info!(saga = %saga, last = ?progress.last_step().map(SagaStep::label), "resuming unfinished saga");
                return Ok((plan, Some(progress)));
            }
        }
        self.record(saga, SagaStep::Begun(fresh.clone()))?;
        Ok((fresh, None))
    }

    /// Settle escrow, credit the student if owed, notify, then persist the
    /// terminal booking state.
    pub(crate) async fn finish_termination(
        &self,
        saga: SagaId,
        plan: &SagaPlan,
        progress: Option<&SagaProgress>,
        mut booking: Booking,
        slot: &AvailabilitySlot,
    ) -> BookingResult<Booking> {
        let SagaPlan::Terminate { student_id, target, settlement, reopen_slot, decided_at, .. } = plan else {
            return Err(BookingError::Storage(format!("saga {saga} does not carry a termination plan")));
        };
        let done = |step: &SagaStep| progress.map_or(false, |p| p.has(step));
        let untouched = progress.map_or(true, |p| p.steps.is_empty());

        let escrow_step = settlement.escrow_step();
        if !done(&escrow_step) {
            if let Err((err, definitive)) = self.settle_escrow(saga.booking_id, settlement).await {
                return Err(self.termination_failed(saga, untouched && definitive, err));
            }
            self.record(saga, escrow_step)?;
        }

        if let Some(credit) = settlement.student_credit() {
            if !done(&SagaStep::BalanceCredited) {
                let request = AdjustBalanceRequest::credit_add(*student_id, credit).with_key(keys::refund(saga));
                if let Err(e) = call_with_deadline("adjust_balance", self.timeout(), self.ledger.adjust_balance(request)).await {
                    return Err(self.termination_failed(saga, false, BookingError::remote("credit_balance", e)));
                }
                self.record(saga, SagaStep::BalanceCredited)?;
            }
        }

        let already_committed = booking.booking_status == *target;
        if target.is_canceled() && !already_committed {
            let by = if *target == BookingStatus::CanceledByStudent { Party::Student } else { Party::Tutor };
            self.notifier.publish(Notification::canceled(&booking, slot, by, self.clock.now()));
        }

        booking.booking_status = *target;
        if target.is_canceled() {
            booking.canceled_at = Some(*decided_at);
        }
        booking.refund_status = settlement.student_credit().is_some();
        booking.updated_at = self.clock.now();
        self.repo.save_booking(&booking, reopen_slot.then_some(false))?;
        self.record(saga, SagaStep::Committed)?;

        info!(
            saga = %saga,
            status = %booking.booking_status,
            refunded = booking.refund_status,
            slot_reopened = *reopen_slot,
            "booking settled"
        );
        Ok(booking)
    }

    /// Release or refund the escrow record. On failure, also says whether
    /// the failure is definitive (nothing changed remotely).
    async fn settle_escrow(&self, booking_id: BookingId, settlement: &Settlement) -> Result<(), (BookingError, bool)> {
        match *settlement {
            Settlement::Release { session_type } => {
                let request = ReleaseLockedCreditsRequest { session_type, booking_id };
                call_with_deadline("release_locked_credits", self.timeout(), self.escrow.release_locked_credits(request))
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        let definitive = is_definitive(&e);
                        (BookingError::remote("release_locked_credits", e), definitive)
                    })
            }
            Settlement::Refund { .. } => {
                let request = RefundLockedCreditsRequest { booking_id };
                match call_with_deadline("refund_locked_credits", self.timeout(), self.escrow.refund_locked_credits(request)).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_not_found() => self.confirm_refunded(booking_id).await,
                    Err(e) => {
                        let definitive = is_definitive(&e);
                        Err((BookingError::remote("refund_locked_credits", e), definitive))
                    }
                }
            }
        }
    }

    /// A refund answered not-found: succeed if an earlier attempt already
    /// refunded the record.
    async fn confirm_refunded(&self, booking_id: BookingId) -> Result<(), (BookingError, bool)> {
        match call_with_deadline("get_escrow", self.timeout(), self.escrow.get_escrow(booking_id)).await {
            Ok(record) if record.status == EscrowStatus::Refunded => {
                debug!(booking = %booking_id.short_id(), "escrow already refunded");
                Ok(())
            }
            Ok(record) => Err((
                BookingError::Conflict(format!("escrow for booking {booking_id} is {}", record.status)),
                record.status.is_terminal(),
            )),
            Err(e) if e.is_not_found() => Err((
                BookingError::NotFound(format!("escrow record for booking {booking_id}")),
                true,
            )),
            Err(e) => Err((BookingError::remote("get_escrow", e), false)),
        }
    }

    fn termination_failed(&self, saga: SagaId, abort: bool, err: BookingError) -> BookingError {
        if abort {
            warn!(saga = %saga, error = %err, "settlement refused before any change; aborting");
            if let Err(log_err) = self.record(saga, SagaStep::Aborted { reason: err.to_string() }) {
                error!(saga = %saga, error = %log_err, "could not record abort");
            }
        } else {
            error!(saga = %saga, error = %err, "settlement step failed; left for retry or recovery");
        }
        err
    }
}

/// The peer answered and refused: the call had no effect.
fn is_definitive(err: &RpcError) -> bool {
    matches!(err, RpcError::NotFound(_) | RpcError::Rejected { .. })
}
