//! Retention tier selection
//!
//! Decides which single tier runs for a dataset today. A tier that has never
//! produced a copy is forced ahead of its calendar slot (month first, then
//! week), so a dataset that starts mid-cycle still builds a full
//! month/week/day history. Otherwise the calendar decides: the 1st of the
//! month is a month run, Sundays are week runs, every other day is a day run.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

use crate::models::{Label, Tier};

/// Outcome of tier selection for one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDecision {
    pub tier: Tier,
    pub label: Label,
    /// The tier was chosen because none of its copies exist yet
    pub forced: bool,
}

/// Choose the tier for `now` and build its label
///
/// `history` is every label currently held for the dataset, in any order.
/// Labels dated today are ignored so that recomputing the decision later the
/// same day (as tidy does) gives the answer the original run got.
pub fn select_tier(history: &[Label], now: NaiveDateTime) -> TierDecision {
    let (tier, forced) = tier_for_day(history, now.date());
    TierDecision {
        tier,
        label: Label::new(tier, now),
        forced,
    }
}

/// Tier and forced flag for `today`, without building a label
pub fn tier_for_day(history: &[Label], today: NaiveDate) -> (Tier, bool) {
    if newest(history, Tier::Month, today).is_none() {
        return (Tier::Month, true);
    }
    if newest(history, Tier::Week, today).is_none() {
        return (Tier::Week, true);
    }

    let tier = if today.day() == 1 {
        Tier::Month
    } else if today.weekday() == Weekday::Sun {
        Tier::Week
    } else {
        Tier::Day
    };
    (tier, false)
}

/// Most recent label of `tier` taken before `today`
pub fn newest(history: &[Label], tier: Tier, today: NaiveDate) -> Option<&Label> {
    history
        .iter()
        .filter(|l| l.tier() == tier && l.date() != today)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(3, 15, 0)
            .unwrap()
    }

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(|n| Label::parse(n).unwrap()).collect()
    }

    fn established() -> Vec<Label> {
        labels(&[
            "month-20240501031500",
            "week-20240526031500",
            "day-20240529031500",
        ])
    }

    #[test]
    fn test_no_month_forces_month_any_day() {
        // A Wednesday, a Sunday and a 1st: always month when none exists.
        for date in ["2024-06-05", "2024-06-09", "2024-07-01"] {
            let decision = select_tier(&[], at(date));
            assert_eq!(decision.tier, Tier::Month, "{}", date);
            assert!(decision.forced);
        }

        let only_days = labels(&["day-20240604031500", "week-20240602031500"]);
        let decision = select_tier(&only_days, at("2024-06-05"));
        assert_eq!(decision.tier, Tier::Month);
        assert!(decision.forced);
    }

    #[test]
    fn test_no_week_forces_week() {
        let history = labels(&["month-20240601031500"]);
        let decision = select_tier(&history, at("2024-06-05"));
        assert_eq!(decision.tier, Tier::Week);
        assert!(decision.forced);
    }

    #[test]
    fn test_first_of_month_is_month() {
        let decision = select_tier(&established(), at("2024-06-01"));
        assert_eq!(decision.tier, Tier::Month);
        assert!(!decision.forced);
    }

    #[test]
    fn test_sunday_is_week() {
        // 2024-06-02 is a Sunday
        let decision = select_tier(&established(), at("2024-06-02"));
        assert_eq!(decision.tier, Tier::Week);
        assert!(!decision.forced);
    }

    #[test]
    fn test_first_of_month_on_sunday_is_month() {
        // 2024-09-01 is a Sunday
        let decision = select_tier(&established(), at("2024-09-01"));
        assert_eq!(decision.tier, Tier::Month);
    }

    #[test]
    fn test_other_days_are_day() {
        for date in ["2024-06-03", "2024-06-04", "2024-06-08", "2024-06-29"] {
            let decision = select_tier(&established(), at(date));
            assert_eq!(decision.tier, Tier::Day, "{}", date);
            assert!(!decision.forced);
        }
    }

    #[test]
    fn test_label_uses_full_timestamp() {
        let decision = select_tier(&established(), at("2024-06-04"));
        assert_eq!(decision.label.to_string(), "day-20240604031500");
    }

    #[test]
    fn test_todays_labels_ignored() {
        // A partial run earlier today created the first month copy; the
        // decision must still be the forced month.
        let history = labels(&["month-20240605010000"]);
        let decision = select_tier(&history, at("2024-06-05"));
        assert_eq!(decision.tier, Tier::Month);
        assert!(decision.forced);
    }

    #[test]
    fn test_newest() {
        let history = labels(&[
            "week-20240519031500",
            "week-20240526031500",
            "week-20240512031500",
        ]);
        let today = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
        assert_eq!(
            newest(&history, Tier::Week, today).map(|l| l.to_string()),
            Some("week-20240526031500".to_string())
        );
        assert!(newest(&history, Tier::Month, today).is_none());
    }
}
