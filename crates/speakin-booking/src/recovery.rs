use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use speakin_saga::{SagaId, SagaJournal, SagaKind, SagaPlan, SagaProgress, SagaStep};

use crate::error::{BookingError, BookingResult};
use crate::locks::LockKey;
use crate::orchestrator::SettlementOrchestrator;

/// Outcome of one recovery sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Sagas driven to their committed end state.
    pub rolled_forward: usize,
    /// Creation sagas undone.
    pub compensated: usize,
    /// Sagas still open, with the error that stopped them.
    pub failed: Vec<(SagaId, String)>,
    /// Records dropped from the log afterwards.
    pub compacted: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    RolledForward,
    Compensated,
}

impl SettlementOrchestrator {
    /// Finish every saga the log shows as open.
    ///
    /// Creation sagas whose booking was persisted are marked committed; the
    /// rest are compensated. Cancel and settle sagas are rolled forward with
    /// their recorded plan. Safe to run while serving: each saga is handled
    /// under its booking's lock and re-read before acting.
    pub async fn recover(&self) -> BookingResult<RecoveryReport> {
        let records = self.sagas.records()?;
        let open = SagaJournal::open_sagas(&records);
        let mut report = RecoveryReport::default();
        if !open.is_empty() {
            info!(open = open.len(), "recovering unfinished sagas");
        }

        for stale in open {
            let id = stale.id;
            let _booking = self.locks.lock(LockKey::Booking(id.booking_id)).await;
            let Some(progress) = SagaJournal::find(self.sagas.as_ref(), id)?.filter(SagaProgress::is_open) else {
                continue;
            };
            match self.recover_one(&progress).await {
                Ok(Outcome::RolledForward) => report.rolled_forward += 1,
                Ok(Outcome::Compensated) => report.compensated += 1,
                Err(e) => {
                    error!(saga = %id, error = %e, "recovery failed; saga stays open");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        report.compacted = self.sagas.compact()?;
        info!(
            rolled_forward = report.rolled_forward,
            compensated = report.compensated,
            failed = report.failed.len(),
            compacted = report.compacted,
            "recovery sweep finished"
        );
        Ok(report)
    }

    async fn recover_one(&self, progress: &SagaProgress) -> BookingResult<Outcome> {
        let id = progress.id;
        let plan = progress
            .plan
            .as_ref()
            .ok_or_else(|| BookingError::Storage(format!("saga {id} has no recorded plan")))?;

        match (id.kind, plan) {
            (SagaKind::Create, SagaPlan::Create { student_id, credits, .. }) => {
                if !progress.is_compensating() && self.repo.booking(id.booking_id)?.is_some() {
                    info!(saga = %id, "booking was persisted; committing");
                    self.record(id, SagaStep::Committed)?;
                    return Ok(Outcome::RolledForward);
                }
                warn!(saga = %id, last = ?progress.last_step().map(SagaStep::label), "compensating interrupted booking");
                self.compensate_create(id, *student_id, *credits, Some(progress), "recovered after interruption")
                    .await?;
                Ok(Outcome::Compensated)
            }
            (SagaKind::Cancel | SagaKind::Settle, SagaPlan::Terminate { .. }) => {
                let booking = self
                    .repo
                    .booking(id.booking_id)?
                    .ok_or_else(|| BookingError::NotFound(format!("booking {}", id.booking_id)))?;
                let slot = self.get_slot(booking.availability_id)?;
                info!(saga = %id, "rolling forward interrupted settlement");
                self.finish_termination(id, plan, Some(progress), booking, &slot).await?;
                Ok(Outcome::RolledForward)
            }
            (kind, _) => Err(BookingError::Storage(format!("saga {id} has a plan that does not fit kind {kind}"))),
        }
    }
}
