//! HTTP implementations of the Speakin cross-service contracts.
//!
//! [`HttpLedgerClient`] talks to the account service and
//! [`HttpEscrowClient`] to the payment service. Both map HTTP failures onto
//! [`speakin_protocol::RpcError`], keeping "not found" apart from other
//! rejections and turning client-side timeouts into
//! [`RpcError::Timeout`](speakin_protocol::RpcError::Timeout).

pub mod config;
pub mod escrow;
pub mod http;
pub mod ledger;

pub use config::ClientConfig;
pub use escrow::HttpEscrowClient;
pub use http::HttpTransport;
pub use ledger::HttpLedgerClient;
