use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of lesson a slot offers.
///
/// A student must complete a trial with a tutor before booking standard
/// lessons with them. The session type also selects the payout share when
/// escrow is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Trial,
    Standard,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "standard" => Ok(Self::Standard),
            other => Err(TypeError::UnknownSessionType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Trial".parse::<SessionType>().unwrap(), SessionType::Trial);
        assert_eq!("STANDARD".parse::<SessionType>().unwrap(), SessionType::Standard);
        assert!("group".parse::<SessionType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&SessionType::Trial).unwrap(), "\"trial\"");
    }
}
