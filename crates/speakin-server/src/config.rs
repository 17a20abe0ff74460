use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use speakin_booking::{BookingPolicy, RetryPolicy};
use speakin_client::ClientConfig;
use speakin_saga::{SyncMode, WalConfig};
use speakin_types::{AccountId, Credits, PayoutPolicy};

use crate::error::{ServerError, ServerResult};

/// Configuration of all three services. Every section is optional in the
/// TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakinConfig {
    pub ledger: LedgerServiceConfig,
    pub escrow: EscrowServiceConfig,
    pub booking: BookingServiceConfig,
    pub notifications: NotificationConfig,
    pub auth: AuthConfig,
}

impl SpeakinConfig {
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.escrow
            .payout
            .validate()
            .map_err(|e| ServerError::Config(format!("escrow.payout: {e}")))?;
        if self.booking.policy.join_window_minutes < 0 {
            return Err(ServerError::Config("booking.policy.join_window_minutes must not be negative".into()));
        }
        if self.notifications.sink == SinkKind::Webhook && self.notifications.webhook_url.is_none() {
            return Err(ServerError::Config("notifications.webhook_url is required for the webhook sink".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAccount {
    pub account_id: AccountId,
    pub balance_credits: Credits,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerServiceConfig {
    pub bind_addr: SocketAddr,
    /// Accounts opened at startup.
    pub accounts: Vec<SeedAccount>,
}

impl Default for LedgerServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            accounts: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowServiceConfig {
    pub bind_addr: SocketAddr,
    pub ledger: ClientConfig,
    pub payout: PayoutPolicy,
}

impl Default for EscrowServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8082)),
            ledger: ClientConfig::new("http://127.0.0.1:8081"),
            payout: PayoutPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingServiceConfig {
    pub bind_addr: SocketAddr,
    pub ledger: ClientConfig,
    pub escrow: ClientConfig,
    pub saga_log: PathBuf,
    /// `fsync` the saga log after every step.
    pub fsync: bool,
    /// Run a recovery sweep before accepting requests.
    pub recover_on_start: bool,
    pub policy: BookingPolicy,
}

impl BookingServiceConfig {
    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            sync_mode: if self.fsync { SyncMode::EveryWrite } else { SyncMode::OsDefault },
        }
    }
}

impl Default for BookingServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ledger: ClientConfig::new("http://127.0.0.1:8081"),
            escrow: ClientConfig::new("http://127.0.0.1:8082"),
            saga_log: PathBuf::from("data/booking-sagas.wal"),
            fsync: true,
            recover_on_start: true,
            policy: BookingPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub sink: SinkKind,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
}

impl NotificationConfig {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            webhook_url: None,
            timeout_secs: 5,
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: AccountId,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = SpeakinConfig::default();
        assert_eq!(c.booking.bind_addr.port(), 8080);
        assert_eq!(c.ledger.bind_addr.port(), 8081);
        assert_eq!(c.escrow.bind_addr.port(), 8082);
        assert_eq!(c.booking.ledger.timeout(), Duration::from_secs(10));
        assert!(c.booking.recover_on_start);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = SpeakinConfig::from_toml(
            r#"
            [booking]
            saga_log = "/var/lib/speakin/sagas.wal"

            [booking.policy]
            no_show_both = "release_to_tutor"

            [[ledger.accounts]]
            account_id = 1
            balance_credits = 100

            [[auth.tokens]]
            token = "s3cret"
            user_id = 1
            "#,
        )
        .unwrap();
        assert_eq!(c.booking.saga_log, PathBuf::from("/var/lib/speakin/sagas.wal"));
        assert_eq!(c.booking.policy.cancellation_cutoff_hours, 3);
        assert_eq!(c.ledger.accounts[0].balance_credits, 100);
        assert!(!c.auth.tokens[0].is_admin);
        assert_eq!(c.escrow.payout, PayoutPolicy::default());
    }

    #[test]
    fn webhook_sink_needs_url() {
        let err = SpeakinConfig::from_toml("[notifications]\nsink = \"webhook\"\n").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn invalid_payout_is_rejected() {
        let err = SpeakinConfig::from_toml("[escrow.payout.standard]\nnumerator = 5\ndenominator = 0\n").unwrap_err();
        assert!(err.to_string().contains("escrow.payout"));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = SpeakinConfig::default().to_toml().unwrap();
        assert_eq!(SpeakinConfig::from_toml(&text).unwrap(), SpeakinConfig::default());
    }
}
