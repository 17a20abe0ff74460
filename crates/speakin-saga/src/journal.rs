use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SagaResult;
use crate::log::SagaLog;
use crate::record::{SagaId, SagaPlan, SagaRecord, SagaStep};

/// Folded state of one saga.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SagaProgress {
    pub id: SagaId,
    pub plan: Option<SagaPlan>,
    /// Steps after `Begun`, in order.
    pub steps: Vec<SagaStep>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaProgress {
    fn begin(id: SagaId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            plan: None,
            steps: Vec::new(),
            started_at: at,
            updated_at: at,
        }
    }

    /// Whether a step of the same kind as `step` was recorded.
    pub fn has(&self, step: &SagaStep) -> bool {
        self.steps.iter().any(|s| s.label() == step.label())
    }

    pub fn is_open(&self) -> bool {
        !self.steps.iter().any(SagaStep::is_terminal)
    }

    pub fn is_compensating(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, SagaStep::Compensating { .. }))
    }

    pub fn last_step(&self) -> Option<&SagaStep> {
        self.steps.last()
    }
}

/// Replays saga records into per-saga progress.
pub struct SagaJournal;

impl SagaJournal {
    /// Fold records in order. A `Begun` for a saga that already closed
    /// starts a fresh attempt.
    pub fn replay(records: &[SagaRecord]) -> BTreeMap<SagaId, SagaProgress> {
        let mut sagas: BTreeMap<SagaId, SagaProgress> = BTreeMap::new();
        for record in records {
            let progress = sagas
                .entry(record.saga)
                .or_insert_with(|| SagaProgress::begin(record.saga, record.recorded_at));
            match &record.step {
                SagaStep::Begun(plan) => {
                    if !progress.is_open() {
                        *progress = SagaProgress::begin(record.saga, record.recorded_at);
                    }
                    if progress.plan.is_none() {
                        progress.plan = Some(plan.clone());
                    }
                }
                step => progress.steps.push(step.clone()),
            }
            progress.updated_at = record.recorded_at;
        }
        sagas
    }

    /// Sagas without a terminal step, oldest first.
    pub fn open_sagas(records: &[SagaRecord]) -> Vec<SagaProgress> {
        let mut open: Vec<SagaProgress> = Self::replay(records)
            .into_values()
            .filter(SagaProgress::is_open)
            .collect();
        open.sort_by_key(|p| (p.started_at, p.id));
        open
    }

    pub fn load(log: &dyn SagaLog) -> SagaResult<BTreeMap<SagaId, SagaProgress>> {
        Ok(Self::replay(&log.records()?))
    }

    /// Progress of one saga, if any record of it exists.
    pub fn find(log: &dyn SagaLog, id: SagaId) -> SagaResult<Option<SagaProgress>> {
        let records: Vec<SagaRecord> = log
            .records()?
            .into_iter()
            .filter(|r| r.saga == id)
            .collect();
        Ok(Self::replay(&records).remove(&id))
    }

    /// Records belonging to the current attempt of each open saga.
    pub fn retain_open(records: &[SagaRecord]) -> Vec<SagaRecord> {
        let open: HashSet<SagaId> = Self::open_sagas(records).into_iter().map(|p| p.id).collect();
        let mut last_begun: HashMap<SagaId, usize> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if matches!(record.step, SagaStep::Begun(_)) {
                last_begun.insert(record.saga, index);
            }
        }
        records
            .iter()
            .enumerate()
            .filter(|(index, record)| {
                open.contains(&record.saga)
                    && *index >= last_begun.get(&record.saga).copied().unwrap_or(0)
            })
            .map(|(_, record)| record.clone())
            .collect()
    }
}
