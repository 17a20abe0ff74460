//! End-to-end booking flows against in-process ledger and escrow services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use speakin_escrow::{EscrowService, EscrowStore, InMemoryEscrowStore, LocalEscrow};
use speakin_ledger::{BalanceReader, BalanceWriter, InMemoryBalanceLedger, LocalLedger};
use speakin_protocol::{
    AdjustBalanceRequest, AdjustBalanceResponse, AdjustMode, BalanceResponse, EscrowResponse,
    EscrowRpc, LedgerRpc, LockCreditsRequest, RefundLockedCreditsRequest,
    ReleaseLockedCreditsRequest, RpcError, RpcResult,
};
use speakin_saga::{
    FileSagaLog, InMemorySagaLog, SagaId, SagaJournal, SagaKind, SagaLog, SagaPlan, SagaRecord,
    SagaStep, WalConfig,
};
use speakin_types::{
    AccountId, BookingId, BookingStatus, Credits, EscrowRecord, EscrowStatus, FixedClock, Party,
    PayoutPolicy, SessionType, SlotId,
};

use crate::error::BookingError;
use crate::memory::InMemoryBookingRepository;
use crate::model::{AvailabilitySlot, Booking, BookingFilter, BookingRequest, BookingUpdate, NewSlot};
use crate::notify::{MemoryPublisher, NotificationKind, Notifier, RetryPolicy};
use crate::orchestrator::SettlementOrchestrator;
use crate::policy::{BookingPolicy, NoShowBothPolicy};
use crate::repo::BookingRepository;

const STUDENT: AccountId = AccountId::new(1);
const TUTOR: AccountId = AccountId::new(2);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

/// Ledger that can be told to drop credit adjustments on the floor.
struct FlakyLedger {
    inner: LocalLedger<InMemoryBalanceLedger>,
    fail_credits: AtomicBool,
    /// Empty the account just before a deduct lands, then stop answering
    /// balance reads.
    drain_before_deduct: AtomicBool,
    fail_reads: AtomicBool,
}

impl FlakyLedger {
    fn over(ledger: &Arc<InMemoryBalanceLedger>) -> Self {
        Self {
            inner: LocalLedger::new(Arc::clone(ledger)),
            fail_credits: AtomicBool::new(false),
            drain_before_deduct: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LedgerRpc for FlakyLedger {
    async fn get_balance(&self, account_id: AccountId) -> RpcResult<BalanceResponse> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection refused".into()));
        }
        self.inner.get_balance(account_id).await
    }

    async fn adjust_balance(&self, request: AdjustBalanceRequest) -> RpcResult<AdjustBalanceResponse> {
        if request.mode == AdjustMode::CreditAdd && self.fail_credits.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection reset".into()));
        }
        if request.mode == AdjustMode::Deduct && self.drain_before_deduct.swap(false, Ordering::SeqCst) {
            self.inner
                .adjust_balance(AdjustBalanceRequest::absolute_set(request.account_id, 0))
                .await?;
            self.fail_reads.store(true, Ordering::SeqCst);
        }
        self.inner.adjust_balance(request).await
    }
}

/// Escrow that can be told to fail locks or releases.
struct FlakyEscrow {
    inner: LocalEscrow<InMemoryEscrowStore>,
    fail_locks: AtomicBool,
    fail_releases: AtomicBool,
}

#[async_trait]
impl EscrowRpc for FlakyEscrow {
    async fn lock_credits(&self, request: LockCreditsRequest) -> RpcResult<EscrowResponse> {
        if self.fail_locks.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("payment service unreachable".into()));
        }
        self.inner.lock_credits(request).await
    }

    async fn refund_locked_credits(&self, request: RefundLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        self.inner.refund_locked_credits(request).await
    }

    async fn release_locked_credits(&self, request: ReleaseLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("payment service unreachable".into()));
        }
        self.inner.release_locked_credits(request).await
    }

    async fn get_escrow(&self, booking_id: BookingId) -> RpcResult<EscrowRecord> {
        self.inner.get_escrow(booking_id).await
    }

    async fn list_escrows(&self, account_id: AccountId) -> RpcResult<Vec<EscrowRecord>> {
        self.inner.list_escrows(account_id).await
    }
}

/// Repository whose local commit always loses the race for the slot.
struct SlotTakenRepo(InMemoryBookingRepository);

impl BookingRepository for SlotTakenRepo {
    fn next_booking_id(&self) -> crate::BookingResult<BookingId> {
        self.0.next_booking_id()
    }
    fn insert_slot(&self, slot: NewSlot, now: DateTime<Utc>) -> crate::BookingResult<AvailabilitySlot> {
        self.0.insert_slot(slot, now)
    }
    fn remove_slot(&self, id: SlotId) -> crate::BookingResult<AvailabilitySlot> {
        self.0.remove_slot(id)
    }
    fn slot(&self, id: SlotId) -> crate::BookingResult<Option<AvailabilitySlot>> {
        self.0.slot(id)
    }
    fn slots(&self, tutor: Option<AccountId>) -> crate::BookingResult<Vec<AvailabilitySlot>> {
        self.0.slots(tutor)
    }
    fn booking(&self, id: BookingId) -> crate::BookingResult<Option<Booking>> {
        self.0.booking(id)
    }
    fn bookings(&self, filter: &BookingFilter) -> crate::BookingResult<Vec<Booking>> {
        self.0.bookings(filter)
    }
    fn confirm_booking(&self, booking: Booking) -> crate::BookingResult<Booking> {
        Err(BookingError::Conflict(format!("slot {} is already booked", booking.availability_id)))
    }
    fn save_booking(&self, booking: &Booking, slot_booked: Option<bool>) -> crate::BookingResult<()> {
        self.0.save_booking(booking, slot_booked)
    }
}

struct World {
    orchestrator: SettlementOrchestrator,
    ledger: Arc<InMemoryBalanceLedger>,
    flaky_ledger: Arc<FlakyLedger>,
    /// The ledger the escrow service pays tutors through.
    payout_ledger: Arc<FlakyLedger>,
    escrow: Arc<EscrowService<InMemoryEscrowStore>>,
    flaky_escrow: Arc<FlakyEscrow>,
    repo: Arc<dyn BookingRepository>,
    sagas: Arc<dyn SagaLog>,
    clock: Arc<FixedClock>,
    sink: Arc<MemoryPublisher>,
}

struct Parts {
    student_credits: Credits,
    policy: BookingPolicy,
    sagas: Arc<dyn SagaLog>,
    repo: Arc<dyn BookingRepository>,
}

impl Default for Parts {
    fn default() -> Self {
        Self {
            student_credits: 0,
            policy: BookingPolicy::default(),
            sagas: Arc::new(InMemorySagaLog::new()),
            repo: Arc::new(InMemoryBookingRepository::new()),
        }
    }
}

impl World {
    fn new(student_credits: Credits) -> Self {
        Self::build(Parts { student_credits, ..Parts::default() })
    }

    fn build(parts: Parts) -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let ledger = Arc::new(InMemoryBalanceLedger::with_accounts([
            (STUDENT, parts.student_credits),
            (TUTOR, 0),
        ]));
        let flaky_ledger = Arc::new(FlakyLedger::over(&ledger));
        let payout_ledger = Arc::new(FlakyLedger::over(&ledger));
        let escrow = Arc::new(EscrowService::new(
            Arc::new(InMemoryEscrowStore::new()),
            payout_ledger.clone(),
            PayoutPolicy::default(),
            clock.clone(),
        ));
        let flaky_escrow = Arc::new(FlakyEscrow {
            inner: LocalEscrow::new(Arc::clone(&escrow)),
            fail_locks: AtomicBool::new(false),
            fail_releases: AtomicBool::new(false),
        });
        let sink = Arc::new(MemoryPublisher::new());
        let (notifier, _worker) = Notifier::spawn(
            sink.clone(),
            RetryPolicy { initial_delay: StdDuration::from_millis(1), ..RetryPolicy::default() },
        );
        let orchestrator = SettlementOrchestrator::new(
            Arc::clone(&parts.repo),
            flaky_ledger.clone(),
            flaky_escrow.clone(),
            Arc::clone(&parts.sagas),
            clock.clone(),
        )
        .with_policy(parts.policy)
        .with_notifier(notifier);

        Self {
            orchestrator,
            ledger,
            flaky_ledger,
            payout_ledger,
            escrow,
            flaky_escrow,
            repo: parts.repo,
            sagas: parts.sagas,
            clock,
            sink,
        }
    }

    fn balance(&self, account: AccountId) -> Credits {
        self.ledger.balance(account).unwrap()
    }

    fn set_balance(&self, account: AccountId, credits: Credits) {
        self.ledger.adjust(&AdjustBalanceRequest::absolute_set(account, credits)).unwrap();
    }

    fn locked(&self) -> Credits {
        self.escrow.store().locked_total().unwrap()
    }

    /// Balances plus credits held in escrow.
    fn circulating(&self) -> u128 {
        self.ledger.total_credits().unwrap() + self.locked() as u128
    }

    fn escrow_status(&self, booking: BookingId) -> Option<EscrowStatus> {
        self.escrow.store().get(booking).unwrap().map(|r| r.status)
    }

    async fn slot(&self, session_type: SessionType, hours_ahead: i64, credits: Credits) -> AvailabilitySlot {
        let start = t0() + Duration::hours(hours_ahead);
        self.orchestrator
            .create_slot(NewSlot {
                tutor_id: TUTOR,
                session_type,
                start_time: start,
                end_time: start + Duration::hours(1),
                credits_required: credits,
            })
            .await
            .unwrap()
    }

    async fn book(&self, slot: &AvailabilitySlot) -> crate::BookingResult<Booking> {
        self.orchestrator
            .create_booking(BookingRequest { availability_id: slot.id, student_id: STUDENT })
            .await
    }

    async fn complete(&self, booking: &Booking, student_on_time: bool, tutor_on_time: bool) -> crate::BookingResult<Booking> {
        let start = self.orchestrator.get_slot(booking.availability_id)?.start_time;
        let at = |on_time: bool| if on_time { start + Duration::minutes(2) } else { start + Duration::minutes(20) };
        self.orchestrator
            .update_booking(
                booking.id,
                BookingUpdate {
                    student_joined_at: Some(at(student_on_time)),
                    tutor_joined_at: Some(at(tutor_on_time)),
                    booking_status: Some(BookingStatus::Completed),
                },
            )
            .await
    }

    /// Every active booking has a locked escrow record; every finished one
    /// has a settled record.
    fn assert_escrow_matches_bookings(&self) {
        for booking in self.repo.bookings(&BookingFilter::default()).unwrap() {
            let status = self.escrow_status(booking.id);
            if booking.booking_status.is_active() {
                assert_eq!(status, Some(EscrowStatus::Locked), "booking {}", booking.id);
            } else {
                assert!(
                    matches!(status, Some(EscrowStatus::Released | EscrowStatus::Refunded)),
                    "booking {} has escrow {status:?}",
                    booking.id
                );
            }
        }
    }
}

/// A student with a completed trial, 100 credits, and a confirmed standard
/// booking costing 40.
async fn scenario_a() -> (World, Booking, AvailabilitySlot) {
    scenario_a_with(Parts::default()).await
}

async fn scenario_a_with(parts: Parts) -> (World, Booking, AvailabilitySlot) {
    let world = World::build(Parts { student_credits: 10, ..parts });
    let trial = world.slot(SessionType::Trial, 24, 10).await;
    let trial_booking = world.book(&trial).await.unwrap();
    world.complete(&trial_booking, true, true).await.unwrap();
    world.set_balance(STUDENT, 100);
    world.set_balance(TUTOR, 0);

    let slot = world.slot(SessionType::Standard, 48, 40).await;
    let booking = world.book(&slot).await.unwrap();
    (world, booking, slot)
}

#[tokio::test]
async fn scenario_a_standard_booking_locks_credits() {
    let (world, booking, slot) = scenario_a().await;
    assert_eq!(world.balance(STUDENT), 60);
    assert_eq!(booking.booking_status, BookingStatus::Confirmed);
    let record = world.escrow.get(booking.id).unwrap();
    assert_eq!(record.credits_locked, 40);
    assert_eq!(record.status, EscrowStatus::Locked);
    assert!(world.orchestrator.get_slot(slot.id).unwrap().is_booked);
    assert!(booking.room_name.as_str().starts_with("room-"));
    assert!(booking.video_call_link.ends_with(booking.room_name.as_str()));
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn scenario_b_tutor_cancel_refunds_and_keeps_slot_booked() {
    let (world, booking, slot) = scenario_a().await;
    let before = world.circulating();

    let canceled = world.orchestrator.cancel_booking(booking.id, Party::Tutor).await.unwrap();

    assert_eq!(canceled.booking_status, BookingStatus::CanceledByTutor);
    assert!(canceled.refund_status);
    assert_eq!(canceled.canceled_at, Some(t0()));
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Refunded));
    assert_eq!(world.balance(STUDENT), 100);
    assert!(world.orchestrator.get_slot(slot.id).unwrap().is_booked);
    assert_eq!(world.circulating(), before);
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn scenario_c_both_join_pays_tutor_eighty_percent() {
    let (world, booking, _) = scenario_a().await;
    let before = world.circulating();

    let done = world.complete(&booking, true, true).await.unwrap();

    assert_eq!(done.booking_status, BookingStatus::Completed);
    assert!(!done.refund_status);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Released));
    assert_eq!(world.balance(TUTOR), 32);
    assert_eq!(world.balance(STUDENT), 60);
    assert_eq!(world.circulating(), before - 8);
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn scenario_d_student_no_show_pays_tutor() {
    let (world, booking, _) = scenario_a().await;
    let done = world.complete(&booking, false, true).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::NoShowByStudent);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Released));
    assert_eq!(world.balance(TUTOR), 32);
    assert_eq!(world.balance(STUDENT), 60);
}

#[tokio::test]
async fn scenario_e_tutor_no_show_refunds_with_bonus() {
    let (world, booking, _) = scenario_a().await;
    let before = world.circulating();

    let done = world.complete(&booking, true, false).await.unwrap();

    assert_eq!(done.booking_status, BookingStatus::NoShowByTutor);
    assert!(done.refund_status);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Refunded));
    assert_eq!(world.balance(STUDENT), 60 + 44);
    assert_eq!(world.balance(TUTOR), 0);
    assert_eq!(world.circulating(), before + 4);
}

#[tokio::test]
async fn scenario_f_insufficient_balance_has_no_side_effects() {
    let world = World::new(10);
    let slot = world.slot(SessionType::Trial, 24, 40).await;

    let err = world.book(&slot).await.unwrap_err();

    assert!(matches!(err, BookingError::InsufficientCredits { required: 40, available: 10 }));
    assert_eq!(world.balance(STUDENT), 10);
    assert_eq!(world.locked(), 0);
    assert!(world.sagas.records().unwrap().is_empty());
    assert!(!world.orchestrator.get_slot(slot.id).unwrap().is_booked);
}

#[tokio::test]
async fn neither_joining_refunds_without_bonus_by_default() {
    let (world, booking, _) = scenario_a().await;
    let done = world.complete(&booking, false, false).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::NoShowBoth);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Refunded));
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn neither_joining_can_release_to_tutor() {
    let policy = BookingPolicy { no_show_both: NoShowBothPolicy::ReleaseToTutor, ..BookingPolicy::default() };
    let (world, booking, _) = scenario_a_with(Parts { policy, ..Parts::default() }).await;
    let done = world.complete(&booking, false, false).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::NoShowBoth);
    assert!(!done.refund_status);
    assert_eq!(world.balance(TUTOR), 32);
}

#[tokio::test]
async fn join_window_edges_are_inclusive() {
    let (world, booking, slot) = scenario_a().await;
    let update = BookingUpdate {
        student_joined_at: Some(slot.start_time - Duration::minutes(5)),
        tutor_joined_at: Some(slot.start_time + Duration::minutes(5) + Duration::seconds(1)),
        booking_status: None,
    };
    let joined = world.orchestrator.update_booking(booking.id, update).await.unwrap();
    assert!(joined.student_joined_within_5min);
    assert!(!joined.tutor_joined_within_5min);
    assert_eq!(joined.booking_status, BookingStatus::Confirmed);

    let done = world
        .orchestrator
        .update_booking(booking.id, BookingUpdate { booking_status: Some(BookingStatus::Completed), ..BookingUpdate::default() })
        .await
        .unwrap();
    assert_eq!(done.booking_status, BookingStatus::NoShowByTutor);
}

#[tokio::test]
async fn ongoing_then_completed() {
    let (world, booking, _) = scenario_a().await;
    let ongoing = world
        .orchestrator
        .update_booking(booking.id, BookingUpdate { booking_status: Some(BookingStatus::Ongoing), ..BookingUpdate::default() })
        .await
        .unwrap();
    assert_eq!(ongoing.booking_status, BookingStatus::Ongoing);
    world.assert_escrow_matches_bookings();

    let done = world.complete(&booking, true, true).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::Completed);

    let again = world.complete(&booking, true, true).await.unwrap_err();
    assert!(matches!(again, BookingError::Conflict(_)));
    assert_eq!(world.balance(TUTOR), 32);
}

#[tokio::test]
async fn other_status_updates_are_invalid_transitions() {
    let (world, booking, _) = scenario_a().await;
    let err = world
        .orchestrator
        .update_booking(
            booking.id,
            BookingUpdate { booking_status: Some(BookingStatus::CanceledByStudent), ..BookingUpdate::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Locked));
}

#[tokio::test]
async fn early_student_cancel_reopens_slot_at_exactly_three_hours() {
    let (world, booking, slot) = scenario_a().await;
    world.clock.set(slot.start_time - Duration::hours(3));
    world.orchestrator.cancel_booking(booking.id, Party::Student).await.unwrap();
    let reopened = world.orchestrator.get_slot(slot.id).unwrap();
    assert!(!reopened.is_booked);
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn late_student_cancel_keeps_slot_booked() {
    let (world, booking, slot) = scenario_a().await;
    world.clock.set(slot.start_time - Duration::hours(3) + Duration::seconds(1));
    let canceled = world.orchestrator.cancel_booking(booking.id, Party::Student).await.unwrap();
    assert_eq!(canceled.booking_status, BookingStatus::CanceledByStudent);
    assert!(world.orchestrator.get_slot(slot.id).unwrap().is_booked);
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn cancel_twice_is_a_conflict() {
    let (world, booking, slot) = scenario_a().await;
    world.orchestrator.cancel_slot_booking(slot.id, Party::Tutor).await.unwrap();
    let err = world.orchestrator.cancel_booking(booking.id, Party::Tutor).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));
    let err = world.orchestrator.cancel_slot_booking(slot.id, Party::Tutor).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn cancel_slot_without_booking_is_not_found() {
    let world = World::new(0);
    let slot = world.slot(SessionType::Trial, 24, 10).await;
    let err = world.orchestrator.cancel_slot_booking(slot.id, Party::Tutor).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));
}

#[tokio::test]
async fn standard_without_trial_is_rejected() {
    let world = World::new(100);
    let slot = world.slot(SessionType::Standard, 24, 40).await;
    let err = world.book(&slot).await.unwrap_err();
    assert!(matches!(err, BookingError::Rejected { ref rule, .. } if rule == "standard_prerequisite"));
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn overlapping_slots_are_refused() {
    let world = World::new(0);
    world.slot(SessionType::Trial, 24, 10).await;
    let start = t0() + Duration::hours(24) + Duration::minutes(30);
    let err = world
        .orchestrator
        .create_slot(NewSlot {
            tutor_id: TUTOR,
            session_type: SessionType::Standard,
            start_time: start,
            end_time: start + Duration::hours(1),
            credits_required: 30,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Rejected { .. }));
}

#[tokio::test]
async fn booked_slot_cannot_be_removed() {
    let (world, _, slot) = scenario_a().await;
    let err = world.orchestrator.remove_slot(slot.id).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));
    let free = world.slot(SessionType::Standard, 96, 40).await;
    world.orchestrator.remove_slot(free.id).await.unwrap();
}

#[tokio::test]
async fn failed_lock_restores_balance() {
    let world = World::new(50);
    let slot = world.slot(SessionType::Trial, 24, 20).await;
    world.flaky_escrow.fail_locks.store(true, Ordering::SeqCst);

    let err = world.book(&slot).await.unwrap_err();

    assert!(matches!(err, BookingError::Remote { operation: "lock_credits", .. }));
    assert_eq!(world.balance(STUDENT), 50);
    assert_eq!(world.locked(), 0);
    assert!(world.repo.bookings(&BookingFilter::default()).unwrap().is_empty());
    assert!(!world.orchestrator.get_slot(slot.id).unwrap().is_booked);
    let open = SagaJournal::open_sagas(&world.sagas.records().unwrap());
    assert!(open.is_empty());

    world.flaky_escrow.fail_locks.store(false, Ordering::SeqCst);
    world.book(&slot).await.unwrap();
    assert_eq!(world.balance(STUDENT), 30);
}

#[tokio::test]
async fn failed_compensation_is_surfaced_and_recovered() {
    let world = World::new(50);
    let slot = world.slot(SessionType::Trial, 24, 20).await;
    world.flaky_escrow.fail_locks.store(true, Ordering::SeqCst);
    world.flaky_ledger.fail_credits.store(true, Ordering::SeqCst);

    let err = world.book(&slot).await.unwrap_err();
    assert!(matches!(err, BookingError::CompensationFailed { operation: "credit_balance", .. }));
    assert_eq!(world.balance(STUDENT), 30);

    world.flaky_ledger.fail_credits.store(false, Ordering::SeqCst);
    let report = world.orchestrator.recover().await.unwrap();
    assert_eq!(report.compensated, 1);
    assert!(report.is_clean());
    assert_eq!(world.balance(STUDENT), 50);
}

#[tokio::test]
async fn lost_slot_race_compensates_both_steps() {
    let world = World::build(Parts {
        student_credits: 50,
        repo: Arc::new(SlotTakenRepo(InMemoryBookingRepository::new())),
        ..Parts::default()
    });
    let slot = world.slot(SessionType::Trial, 24, 20).await;

    let err = world.book(&slot).await.unwrap_err();

    assert!(matches!(err, BookingError::Conflict(_)));
    assert_eq!(world.balance(STUDENT), 50);
    assert_eq!(world.locked(), 0);
    let booking_id = BookingId::new(1);
    assert_eq!(world.escrow_status(booking_id), Some(EscrowStatus::Refunded));
}

#[tokio::test]
async fn failed_cancel_credit_resumes_on_retry() {
    let (world, booking, _) = scenario_a().await;
    world.flaky_ledger.fail_credits.store(true, Ordering::SeqCst);

    let err = world.orchestrator.cancel_booking(booking.id, Party::Tutor).await.unwrap_err();
    assert!(matches!(err, BookingError::Remote { operation: "credit_balance", .. }));
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Refunded));
    assert_eq!(world.orchestrator.get_booking(booking.id).unwrap().booking_status, BookingStatus::Confirmed);

    world.flaky_ledger.fail_credits.store(false, Ordering::SeqCst);
    let canceled = world.orchestrator.cancel_booking(booking.id, Party::Tutor).await.unwrap();
    assert_eq!(canceled.booking_status, BookingStatus::CanceledByTutor);
    assert_eq!(world.balance(STUDENT), 100);
}

#[tokio::test]
async fn failed_release_leaves_booking_for_retry() {
    let (world, booking, _) = scenario_a().await;
    world.flaky_escrow.fail_releases.store(true, Ordering::SeqCst);

    let err = world.complete(&booking, true, true).await.unwrap_err();
    assert!(matches!(err, BookingError::Remote { operation: "release_locked_credits", .. }));
    assert!(!err.is_client_error());
    let stored = world.orchestrator.get_booking(booking.id).unwrap();
    assert_eq!(stored.booking_status, BookingStatus::Confirmed);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Locked));
    assert_eq!(world.balance(TUTOR), 0);
    assert_eq!(SagaJournal::open_sagas(&world.sagas.records().unwrap()).len(), 1);

    world.flaky_escrow.fail_releases.store(false, Ordering::SeqCst);
    let done = world.complete(&booking, true, true).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::Completed);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Released));
    assert_eq!(world.balance(TUTOR), 32);
    assert_eq!(world.balance(STUDENT), 60);
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn failed_payout_on_student_no_show_is_finished_by_recovery() {
    let (world, booking, _) = scenario_a().await;
    world.payout_ledger.fail_credits.store(true, Ordering::SeqCst);

    let err = world.complete(&booking, false, true).await.unwrap_err();
    assert!(matches!(err, BookingError::Remote { operation: "release_locked_credits", .. }));
    assert_eq!(
        world.orchestrator.get_booking(booking.id).unwrap().booking_status,
        BookingStatus::Confirmed
    );
    // The record is released but the tutor is not yet paid.
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Released));
    assert_eq!(world.balance(TUTOR), 0);

    // Still unpaid: a retry reports the failure instead of completing.
    assert!(world.complete(&booking, false, true).await.is_err());
    assert_eq!(
        world.orchestrator.get_booking(booking.id).unwrap().booking_status,
        BookingStatus::Confirmed
    );

    world.payout_ledger.fail_credits.store(false, Ordering::SeqCst);
    let report = world.orchestrator.recover().await.unwrap();
    assert_eq!(report.rolled_forward, 1);
    assert!(report.is_clean());

    let settled = world.orchestrator.get_booking(booking.id).unwrap();
    assert_eq!(settled.booking_status, BookingStatus::NoShowByStudent);
    assert!(!settled.refund_status);
    assert_eq!(world.balance(TUTOR), 32);
    assert_eq!(world.balance(STUDENT), 60);

    world.orchestrator.recover().await.unwrap();
    assert_eq!(world.balance(TUTOR), 32);
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn failed_tutor_no_show_credit_pays_bonus_once_on_retry() {
    let (world, booking, _) = scenario_a().await;
    world.flaky_ledger.fail_credits.store(true, Ordering::SeqCst);

    let err = world.complete(&booking, true, false).await.unwrap_err();
    assert!(matches!(err, BookingError::Remote { operation: "credit_balance", .. }));
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Refunded));
    assert_eq!(world.balance(STUDENT), 60);
    assert_eq!(
        world.orchestrator.get_booking(booking.id).unwrap().booking_status,
        BookingStatus::Confirmed
    );

    world.flaky_ledger.fail_credits.store(false, Ordering::SeqCst);
    let done = world.complete(&booking, true, false).await.unwrap();
    assert_eq!(done.booking_status, BookingStatus::NoShowByTutor);
    assert!(done.refund_status);
    assert_eq!(world.balance(STUDENT), 60 + 44);

    let again = world.complete(&booking, true, false).await.unwrap_err();
    assert!(matches!(again, BookingError::Conflict(_)));
    assert_eq!(world.balance(STUDENT), 60 + 44);
    assert_eq!(world.balance(TUTOR), 0);
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn tutor_booking_own_slot_is_rejected_by_rules() {
    let world = World::new(50);
    world.set_balance(TUTOR, 50);
    let slot = world.slot(SessionType::Trial, 24, 20).await;

    let err = world
        .orchestrator
        .create_booking(BookingRequest { availability_id: slot.id, student_id: TUTOR })
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Rejected { .. }));
    assert_eq!(world.balance(TUTOR), 50);
    assert!(world.sagas.records().unwrap().is_empty());
}

#[tokio::test]
async fn balance_drained_before_deduct_is_insufficient() {
    let world = World::new(50);
    let slot = world.slot(SessionType::Trial, 24, 20).await;
    world.flaky_ledger.drain_before_deduct.store(true, Ordering::SeqCst);

    let err = world.book(&slot).await.unwrap_err();

    assert!(matches!(err, BookingError::InsufficientCredits { required: 20, available: 0 }));
    assert!(err.is_client_error());
    assert_eq!(world.balance(STUDENT), 0);
    assert_eq!(world.locked(), 0);
    assert!(SagaJournal::open_sagas(&world.sagas.records().unwrap()).is_empty());
    assert!(!world.orchestrator.get_slot(slot.id).unwrap().is_booked);
}

#[tokio::test]
async fn recovery_rolls_cancel_forward() {
    let (world, booking, _) = scenario_a().await;
    world.flaky_ledger.fail_credits.store(true, Ordering::SeqCst);
    world.orchestrator.cancel_booking(booking.id, Party::Student).await.unwrap_err();

    // A settle attempt is refused while the cancel is unfinished.
    let err = world.complete(&booking, true, true).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict(_)));

    world.flaky_ledger.fail_credits.store(false, Ordering::SeqCst);
    let report = world.orchestrator.recover().await.unwrap();
    assert_eq!(report.rolled_forward, 1);
    assert!(report.compacted > 0);

    let canceled = world.orchestrator.get_booking(booking.id).unwrap();
    assert_eq!(canceled.booking_status, BookingStatus::CanceledByStudent);
    assert_eq!(world.balance(STUDENT), 100);
    assert!(world.sagas.records().unwrap().is_empty());
    world.assert_escrow_matches_bookings();
}

#[tokio::test]
async fn recovery_after_crash_compensates_from_file_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sagas.wal");
    let booking_id = BookingId::new(77);
    let slot_id = SlotId::new(1);

    // A process deducted and locked, then died before confirming.
    let world = {
        let sagas: Arc<dyn SagaLog> = Arc::new(FileSagaLog::open(&path, WalConfig::default()).unwrap());
        let world = World::build(Parts { student_credits: 50, sagas: Arc::clone(&sagas), ..Parts::default() });
        let saga = SagaId::new(booking_id, SagaKind::Create);
        let plan = SagaPlan::Create {
            slot_id,
            student_id: STUDENT,
            tutor_id: TUTOR,
            session_type: SessionType::Trial,
            credits: 20,
        };
        for step in [SagaStep::Begun(plan), SagaStep::BalanceDeducted, SagaStep::EscrowLocked] {
            sagas.append(&SagaRecord::new(saga, step, t0())).unwrap();
        }
        world
            .ledger
            .adjust(&AdjustBalanceRequest::deduct(STUDENT, 20).with_key("booking:77:deduct"))
            .unwrap();
        world
            .escrow
            .lock(&LockCreditsRequest { student_id: STUDENT, tutor_id: TUTOR, booking_id, credits_required: 20 })
            .await
            .unwrap();
        world
    };
    assert_eq!(world.balance(STUDENT), 30);

    let reopened: Arc<dyn SagaLog> = Arc::new(FileSagaLog::open(&path, WalConfig::default()).unwrap());
    let restarted = SettlementOrchestrator::new(
        Arc::clone(&world.repo),
        world.flaky_ledger.clone(),
        world.flaky_escrow.clone(),
        reopened,
        world.clock.clone(),
    );
    let report = restarted.recover().await.unwrap();

    assert_eq!(report.compensated, 1);
    assert_eq!(world.balance(STUDENT), 50);
    assert_eq!(world.escrow_status(booking_id), Some(EscrowStatus::Refunded));

    let report = restarted.recover().await.unwrap();
    assert_eq!(report, crate::RecoveryReport::default());
}

#[tokio::test]
async fn recovery_commits_persisted_booking() {
    let world = World::new(50);
    let slot = world.slot(SessionType::Trial, 24, 20).await;
    let booking = world.book(&slot).await.unwrap();
    // Drop the commit record as if the process died right after the local write.
    let records: Vec<SagaRecord> = world
        .sagas
        .records()
        .unwrap()
        .into_iter()
        .filter(|r| r.step != SagaStep::Committed)
        .collect();
    let log: Arc<dyn SagaLog> = Arc::new(InMemorySagaLog::new());
    for record in &records {
        log.append(record).unwrap();
    }
    let restarted = SettlementOrchestrator::new(
        Arc::clone(&world.repo),
        world.flaky_ledger.clone(),
        world.flaky_escrow.clone(),
        log,
        world.clock.clone(),
    );

    let report = restarted.recover().await.unwrap();

    assert_eq!(report.rolled_forward, 1);
    assert_eq!(world.balance(STUDENT), 30);
    assert_eq!(world.escrow_status(booking.id), Some(EscrowStatus::Locked));
}

#[tokio::test]
async fn confirm_and_cancel_are_notified() {
    let (world, booking, _) = scenario_a().await;
    world.orchestrator.cancel_booking(booking.id, Party::Tutor).await.unwrap();

    // Trial confirmation, standard confirmation, cancellation.
    let got = world.sink.wait_for_count(3, StdDuration::from_secs(2)).await;
    assert_eq!(got.len(), 3);
    let last = got.last().unwrap();
    assert_eq!(last.kind, NotificationKind::BookingCanceled);
    assert_eq!(last.canceled_by, Some(Party::Tutor));
    assert_eq!(last.booking_id, booking.id);
}

#[tokio::test]
async fn concurrent_bookings_of_one_slot_confirm_once() {
    let world = Arc::new(World::new(0));
    let slot = world.slot(SessionType::Trial, 24, 10).await;
    let other = AccountId::new(3);
    world.ledger.open_account(other, 100).unwrap();
    world.set_balance(STUDENT, 100);

    let a = {
        let world = Arc::clone(&world);
        let slot = slot.clone();
        tokio::spawn(async move { world.book(&slot).await })
    };
    let b = {
        let world = Arc::clone(&world);
        tokio::spawn(async move {
            world
                .orchestrator
                .create_booking(BookingRequest { availability_id: slot.id, student_id: other })
                .await
        })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(world.balance(STUDENT) + world.balance(other), 190);
    assert_eq!(world.locked(), 10);
    world.assert_escrow_matches_bookings();
}
