use std::path::Path;
use std::sync::Mutex;

use tracing::info;

use crate::error::{SagaError, SagaResult};
use crate::journal::SagaJournal;
use crate::record::SagaRecord;
use crate::wal::{WalConfig, WriteAheadLog};

/// Durable, append-only store of saga steps.
pub trait SagaLog: Send + Sync {
    fn append(&self, record: &SagaRecord) -> SagaResult<()>;

    /// Every record still held, in append order.
    fn records(&self) -> SagaResult<Vec<SagaRecord>>;

    /// Drop the records of closed sagas. Returns how many were dropped.
    fn compact(&self) -> SagaResult<usize>;
}

/// Saga log backed by a [`WriteAheadLog`] file, with an in-memory mirror
/// so lookups do not re-read the file.
pub struct FileSagaLog {
    wal: WriteAheadLog,
    cache: Mutex<Vec<SagaRecord>>,
}

impl FileSagaLog {
    pub fn open(path: &Path, config: WalConfig) -> SagaResult<Self> {
        let wal = WriteAheadLog::open(path, config)?;
        let records = wal.recover()?;
        info!(path = %path.display(), records = records.len(), "saga log opened");
        Ok(Self {
            wal,
            cache: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        self.wal.path()
    }
}

impl SagaLog for FileSagaLog {
    fn append(&self, record: &SagaRecord) -> SagaResult<()> {
        let mut cache = self.cache.lock().map_err(|_| SagaError::LockPoisoned)?;
        self.wal.append(record)?;
        cache.push(record.clone());
        Ok(())
    }

    fn records(&self) -> SagaResult<Vec<SagaRecord>> {
        Ok(self.cache.lock().map_err(|_| SagaError::LockPoisoned)?.clone())
    }

    fn compact(&self) -> SagaResult<usize> {
        let mut cache = self.cache.lock().map_err(|_| SagaError::LockPoisoned)?;
        let kept = SagaJournal::retain_open(&cache);
        let dropped = cache.len() - kept.len();
        if dropped > 0 {
            self.wal.rewrite(&kept)?;
            *cache = kept;
            info!(dropped, "saga log compacted");
        }
        Ok(dropped)
    }
}

/// Saga log held in memory, for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemorySagaLog {
    records: Mutex<Vec<SagaRecord>>,
}

impl InMemorySagaLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SagaLog for InMemorySagaLog {
    fn append(&self, record: &SagaRecord) -> SagaResult<()> {
        self.records
            .lock()
            .map_err(|_| SagaError::LockPoisoned)?
            .push(record.clone());
        Ok(())
    }

    fn records(&self) -> SagaResult<Vec<SagaRecord>> {
        Ok(self.records.lock().map_err(|_| SagaError::LockPoisoned)?.clone())
    }

    fn compact(&self) -> SagaResult<usize> {
        let mut records = self.records.lock().map_err(|_| SagaError::LockPoisoned)?;
        let kept = SagaJournal::retain_open(&records);
        let dropped = records.len() - kept.len();
        *records = kept;
        Ok(dropped)
    }
}
