//! Balance ledger for the Speakin account service.
//!
//! Owns each account's spendable credit balance. Balances change only
//! through [`BalanceWriter::adjust`], which supports overwriting, crediting,
//! and an atomic check-and-deduct. Adjustments may carry an idempotency key
//! so a retried request is applied at most once.

pub mod error;
pub mod memory;
pub mod rpc;
pub mod traits;

pub use error::LedgerError;
pub use memory::InMemoryBalanceLedger;
pub use rpc::LocalLedger;
pub use traits::{AccountBalance, BalanceReader, BalanceWriter};
