use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::session::SessionType;
use crate::Credits;

/// A fraction of an amount of credits, rounded down when applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutShare {
    pub numerator: u64,
    pub denominator: u64,
}

impl PayoutShare {
    /// Build a share, rejecting zero denominators and shares above one.
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, TypeError> {
        if denominator == 0 || numerator > denominator {
            return Err(TypeError::InvalidShare { numerator, denominator });
        }
        Ok(Self { numerator, denominator })
    }

    /// `pct` percent. Values above 100 are clamped.
    pub const fn percent(pct: u64) -> Self {
        let pct = if pct > 100 { 100 } else { pct };
        Self { numerator: pct, denominator: 100 }
    }

    pub const fn whole() -> Self {
        Self { numerator: 1, denominator: 1 }
    }

    /// `floor(credits * numerator / denominator)`.
    pub fn apply(&self, credits: Credits) -> Credits {
        if self.denominator == 0 {
            return 0;
        }
        let scaled = credits as u128 * self.numerator as u128 / self.denominator as u128;
        scaled as Credits
    }

    pub fn is_valid(&self) -> bool {
        self.denominator != 0 && self.numerator <= self.denominator
    }
}

/// Tutor share of released escrow, per session type.
///
/// Whatever the tutor does not receive is the platform fee; it leaves
/// circulation when escrow is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutPolicy {
    pub trial: PayoutShare,
    pub standard: PayoutShare,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            trial: PayoutShare::whole(),
            standard: PayoutShare::percent(80),
        }
    }
}

impl PayoutPolicy {
    pub fn share_for(&self, session_type: SessionType) -> PayoutShare {
        match session_type {
            SessionType::Trial => self.trial,
            SessionType::Standard => self.standard,
        }
    }

    /// Credits paid to the tutor when `credits` are released.
    pub fn payout(&self, session_type: SessionType, credits: Credits) -> Credits {
        self.share_for(session_type).apply(credits)
    }

    /// Credits retained by the platform when `credits` are released.
    pub fn platform_fee(&self, session_type: SessionType, credits: Credits) -> Credits {
        credits - self.payout(session_type, credits)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        for share in [self.trial, self.standard] {
            if !share.is_valid() {
                return Err(TypeError::InvalidShare {
                    numerator: share.numerator,
                    denominator: share.denominator,
                });
            }
        }
        Ok(())
    }
}
