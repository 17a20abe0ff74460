use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where a remote service lives and how long to wait for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ten_seconds() {
        let config = ClientConfig::new("http://ledger:8081");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.base_url, "http://ledger:8081");
    }

    #[test]
    fn timeout_never_drops_to_zero() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(200));
        assert_eq!(config.timeout(), Duration::from_secs(1));
    }
}
