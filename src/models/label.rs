//! Tier-prefixed, timestamp-suffixed labels
//!
//! A label such as `month-20240601120000` names one snapshot and, derived
//! from it, one archive. The timestamp is fixed-width local time so the
//! parsed value gives a total, monotonic order; ordering never depends on
//! the raw string.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::tier::Tier;
use crate::error::ZborgError;

/// strftime format of the timestamp part of a label
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const TIMESTAMP_WIDTH: usize = 14;

/// A parsed snapshot/archive label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    tier: Tier,
    stamp: NaiveDateTime,
}

impl Label {
    /// Create a label for a tier at the given time (sub-second precision is dropped)
    pub fn new(tier: Tier, stamp: NaiveDateTime) -> Self {
        let stamp = stamp.with_nanosecond(0).unwrap_or(stamp);
        Self { tier, stamp }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn stamp(&self) -> NaiveDateTime {
        self.stamp
    }

    /// Calendar day the label was taken on
    pub fn date(&self) -> NaiveDate {
        self.stamp.date()
    }

    /// Parse a label, returning `None` for anything that is not one of ours
    pub fn parse(s: &str) -> Option<Self> {
        let (prefix, stamp) = s.split_once('-')?;
        let tier = match prefix {
            "month" => Tier::Month,
            "week" => Tier::Week,
            "day" => Tier::Day,
            _ => return None,
        };
        if stamp.len() != TIMESTAMP_WIDTH || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let stamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self { tier, stamp })
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tier, self.stamp.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Label {
    type Err = ZborgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ZborgError::Precondition(format!("Not a tier label: {}", s)))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stamp
            .cmp(&other.stamp)
            .then_with(|| self.tier.cmp(&other.tier))
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse every label in `names` belonging to `tier`, newest first
pub fn tier_history<'a, I>(names: I, tier: Tier) -> Vec<Label>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut labels: Vec<Label> = names
        .into_iter()
        .filter_map(Label::parse)
        .filter(|l| l.tier() == tier)
        .collect();
    labels.sort_by(|a, b| b.cmp(a));
    labels
}
