//! Durable saga step log for Speakin settlement.
//!
//! Every cross-service step the booking service takes (deducting a balance,
//! locking escrow, refunding, releasing, crediting) is recorded here before
//! and after it happens. After a crash, [`SagaJournal`] replays the log and
//! reports which bookings were left mid-flight so they can be compensated or
//! rolled forward.

pub mod error;
pub mod journal;
pub mod log;
pub mod record;
pub mod wal;

pub use error::{SagaError, SagaResult};
pub use journal::{SagaJournal, SagaProgress};
pub use log::{FileSagaLog, InMemorySagaLog, SagaLog};
pub use record::{SagaId, SagaKind, SagaPlan, SagaRecord, SagaStep, Settlement};
pub use wal::{SyncMode, WalConfig, WriteAheadLog};
