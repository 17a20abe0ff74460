//! HTTP services for Speakin settlement.
//!
//! Three axum services share this crate: the account service (balance
//! ledger), the payment service (escrow and purchases), and the session
//! service (slots and bookings, bearer-authenticated). [`SpeakinServer`]
//! runs any one of them, or all three in one process.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AuthProvider, Authenticated, Credentials, Identity, StaticTokenAuth};
pub use config::{
    AuthConfig, BookingServiceConfig, EscrowServiceConfig, LedgerServiceConfig, NotificationConfig,
    SeedAccount, SinkKind, SpeakinConfig, TokenEntry,
};
pub use error::{ServerError, ServerResult};
pub use router::{build_booking_router, build_escrow_router, build_ledger_router};
pub use server::{ServiceKind, SpeakinServer};
pub use state::{BookingState, EscrowState, LedgerState, LedgerStore};
