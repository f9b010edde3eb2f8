use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use anyhow::Context as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Exact unsigned amount in the smallest unit of an asset (sats, wei, ...).
///
/// Always rendered as a base-10 string so that values above `u64::MAX`
/// (EVM token amounts) survive storage and JSON without rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        anyhow::ensure!(
            !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
            "invalid amount {s:?}: expected base-10 digits"
        );
        let value = U256::from_str_radix(s, 10).with_context(|| format!("parse amount {s}"))?;
        Ok(Self(value))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e| serde::de::Error::custom(format!("{e:#}")))
    }
}
