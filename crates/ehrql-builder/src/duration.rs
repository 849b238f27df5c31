//! Calendar-aware date arithmetic used when a `date + Duration` can be
//! folded immediately (spec §4.5's normative month/year rules).
//!
//! A [`Duration`] is always a fixed, compile-time-known offset — there is
//! no "dynamic duration"; a day count computed from data is added
//! directly via [`crate::series::Series::add_days`] and friends, which
//! always emit a QM node rather than folding. So "both sides static"
//! (spec §4.3) reduces to: fold whenever the date side is itself a
//! literal.
//!
//! These rules are necessarily re-expressed as SQL in `ehrql-dialect` —
//! the same calendar semantics, once for this immediate-fold path and
//! once per backend's date functions.

use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DurationUnit {
    Days,
    Months,
    Years,
}

/// A fixed calendar offset: `value` units of `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub(crate) value: i64,
    pub(crate) unit: DurationUnit,
}

impl Duration {
    /// A whole-day offset.
    pub fn days(value: i64) -> Self {
        Self { value, unit: DurationUnit::Days }
    }

    /// A whole-month offset (day-of-month overflow clips to month end).
    pub fn months(value: i64) -> Self {
        Self { value, unit: DurationUnit::Months }
    }

    /// A whole-year offset (Feb 29 rolls to Mar 1 in non-leap years).
    pub fn years(value: i64) -> Self {
        Self { value, unit: DurationUnit::Years }
    }

    pub(crate) fn negate(self) -> Self {
        Self { value: -self.value, unit: self.unit }
    }
}

/// Add whole months, clipping day-of-month overflow to the last day of
/// the result month (e.g. Jan 31 + 1 month = Feb 28/29).
pub(crate) fn add_months(date: NaiveDate, months: i64) -> NaiveDate {
    let total = i64::from(date.month0()) + months;
    let year = i64::from(date.year()) + total.div_euclid(12);
    let month = u32::try_from(total.rem_euclid(12)).expect("rem_euclid(12) is in 0..12") + 1;
    let year = i32::try_from(year).expect("dataset dates stay within i32 year range");
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clipped day is always valid")
}

/// Add whole years. Feb 29 + N years rolls over to Mar 1 in a non-leap
/// target year rather than clipping to Feb 28.
pub(crate) fn add_years(date: NaiveDate, years: i64) -> NaiveDate {
    let year = i64::from(date.year()) + years;
    let year = i32::try_from(year).expect("dataset dates stay within i32 year range");
    if date.month() == 2 && date.day() == 29 {
        NaiveDate::from_ymd_opt(year, 2, 29)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 3, 1).expect("March 1 is always valid"))
    } else {
        NaiveDate::from_ymd_opt(year, date.month(), date.day())
            .expect("day is valid in any year except a Feb 29 source date")
    }
}

/// Add a signed day count, returning `None` on calendar overflow.
pub(crate) fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(chrono::Duration::days(days))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("month is in 1..=12");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    u32::try_from((next.expect("next month is always valid") - first).num_days()).expect("a month spans a small positive day count")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_overflow_clips_to_month_end() {
        assert_eq!(
            add_months(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), 1),
            NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()
        );
        assert_eq!(
            add_months(NaiveDate::from_ymd_opt(2021, 1, 31).unwrap(), 1),
            NaiveDate::from_ymd_opt(2021, 2, 28).unwrap()
        );
    }

    #[test]
    fn year_add_rolls_feb29_over_in_non_leap_years() {
        assert_eq!(
            add_years(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(), 1),
            NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()
        );
        assert_eq!(
            add_years(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(), 4),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn day_add_is_plain_calendar_arithmetic() {
        assert_eq!(
            add_days(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 30),
            Some(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap())
        );
    }
}
