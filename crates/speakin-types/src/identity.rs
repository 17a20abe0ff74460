use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Prefixed form used in logs, e.g. `acct:42`.
            pub fn short_id(self) -> String {
                format!(concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            /// Accepts both the bare number and the prefixed form.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                raw.parse::<u64>()
                    .map(Self)
                    .map_err(|_| TypeError::InvalidId(s.to_string()))
            }
        }
    };
}

numeric_id!(
    /// Identifier of a user account (student or tutor) in the balance ledger.
    AccountId,
    "acct"
);

numeric_id!(
    /// Identifier of a booking. Escrow records are keyed by it.
    BookingId,
    "bk"
);

numeric_id!(
    /// Identifier of a tutor availability slot.
    SlotId,
    "slot"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_short_id() {
        let id = AccountId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.short_id(), "acct:42");
        assert_eq!(format!("{id:?}"), "AccountId(42)");
        assert_eq!(BookingId::new(7).short_id(), "bk:7");
        assert_eq!(SlotId::new(3).short_id(), "slot:3");
    }

    #[test]
    fn parse_bare_and_prefixed() {
        assert_eq!("42".parse::<AccountId>().unwrap(), AccountId::new(42));
        assert_eq!("acct:42".parse::<AccountId>().unwrap(), AccountId::new(42));
        assert_eq!("bk:9".parse::<BookingId>().unwrap(), BookingId::new(9));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "slot:x".parse::<SlotId>(),
            Err(TypeError::InvalidId(_))
        ));
        assert!("bk:1".parse::<AccountId>().is_err());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&BookingId::new(11)).unwrap();
        assert_eq!(json, "11");
        let back: BookingId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BookingId::new(11));
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(SlotId::new(1) < SlotId::new(2));
    }
}
