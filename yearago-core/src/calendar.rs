//! Calendar arithmetic for pairing a day with the same day one year earlier.

use chrono::{Days, Months};

use crate::model::DateKey;

/// Number of trailing days in the weekly view.
pub const WEEK_LEN: u32 = 7;

/// Same calendar day one year earlier.
///
/// Subtracts twelve calendar months rather than 365 days, so Feb 29 lands on
/// Feb 28 of the previous year.
pub fn resolve_last_year(date: DateKey) -> DateKey {
    date.date()
        .checked_sub_months(Months::new(12))
        .map(DateKey::new)
        // Only reachable at chrono's minimum representable year.
        .unwrap_or(date)
}

/// The `n` calendar days strictly before `today`, most recent first.
pub fn trailing_days(today: DateKey, n: u32) -> Vec<DateKey> {
    (1..=u64::from(n))
        .filter_map(|offset| today.date().checked_sub_days(Days::new(offset)))
        .map(DateKey::new)
        .collect()
}
