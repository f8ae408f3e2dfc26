//! Retention tiers and their keep counts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ZborgError;

/// Retention tier of a snapshot/archive
///
/// Variants are declared lowest priority first so the derived ordering gives
/// `Month > Week > Day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Day,
    Week,
    Month,
}

impl Tier {
    /// All tiers, highest priority first
    pub const ALL: [Tier; 3] = [Tier::Month, Tier::Week, Tier::Day];

    /// Label prefix for this tier (without the trailing dash)
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

impl FromStr for Tier {
    type Err = ZborgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            "day" => Ok(Self::Day),
            other => Err(ZborgError::Config(format!("Unknown tier: {}", other))),
        }
    }
}

/// Per-tier keep counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub month_keep: u32,
    pub week_keep: u32,
    pub day_keep: u32,
}

impl RetentionPolicy {
    /// Keep count for a single tier
    pub fn keep_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Month => self.month_keep,
            Tier::Week => self.week_keep,
            Tier::Day => self.day_keep,
        }
    }
}
