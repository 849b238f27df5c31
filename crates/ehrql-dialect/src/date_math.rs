//! Calendar arithmetic backing every dialect's date functions (spec
//! §4.5, normative). Re-expresses the same rules `ehrql-builder`'s
//! `duration` module folds at construction time for literal dates — its
//! own doc comment anticipates this: "the same calendar semantics, once
//! for this immediate-fold path and once per backend's date functions."

use chrono::{Datelike, NaiveDate};

/// Add whole months, clipping day-of-month overflow to the last day of
/// the result month (e.g. Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: NaiveDate, months: i64) -> NaiveDate {
    let total = i64::from(date.month0()) + months;
    let year = i64::from(date.year()) + total.div_euclid(12);
    let month = u32::try_from(total.rem_euclid(12)).expect("rem_euclid(12) is in 0..12") + 1;
    let year = i32::try_from(year).expect("dataset dates stay within i32 year range");
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clipped day is always valid")
}

/// Add whole years. Feb 29 + N years rolls over to Mar 1 in a non-leap
/// target year rather than clipping to Feb 28.
pub fn add_years(date: NaiveDate, years: i64) -> NaiveDate {
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

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("month is in 1..=12");
    let next =
        if month == 12 { NaiveDate::from_ymd_opt(year + 1, 1, 1) } else { NaiveDate::from_ymd_opt(year, month + 1, 1) };
    u32::try_from((next.expect("next month is always valid") - first).num_days())
        .expect("a month spans a small positive day count")
}

/// Signed day count from `b` to `a`.
pub fn day_difference(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days()
}

/// Whole years elapsed from `b` to `a` (spec §8: "if `a + N years > b`
/// then the result is `N − 1`", generalized to a signed difference).
pub fn whole_years(a: NaiveDate, b: NaiveDate) -> i64 {
    let sign = if a >= b { 1 } else { -1 };
    let (early, late) = if a >= b { (b, a) } else { (a, b) };
    let mut n = i64::from(late.year() - early.year());
    if add_years(early, n) > late {
        n -= 1;
    }
    sign * n
}

/// Whole months elapsed from `b` to `a`, analogous to [`whole_years`].
pub fn whole_months(a: NaiveDate, b: NaiveDate) -> i64 {
    let sign = if a >= b { 1 } else { -1 };
    let (early, late) = if a >= b { (b, a) } else { (a, b) };
    let mut n = i64::from(late.year() - early.year()) * 12 + i64::from(late.month()) - i64::from(early.month());
    if add_months(early, n) > late {
        n -= 1;
    }
    sign * n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_overflow_clips_to_month_end() {
        assert_eq!(add_months(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), 1), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
        assert_eq!(add_months(NaiveDate::from_ymd_opt(2021, 1, 31).unwrap(), 1), NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
    }

    #[test]
    fn year_add_rolls_feb29_over_in_non_leap_years() {
        assert_eq!(add_years(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(), 1), NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        assert_eq!(add_years(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(), 4), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn whole_years_rounds_down_when_anniversary_has_not_occurred() {
        let a = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2000, 9, 2).unwrap();
        assert_eq!(whole_years(a, b), 19);
    }

    #[test]
    fn whole_years_matches_age_at_index_seed_scenario() {
        let index = NaiveDate::from_ymd_opt(2010, 6, 1).unwrap();
        assert_eq!(whole_years(index, NaiveDate::from_ymd_opt(1990, 8, 10).unwrap()), 19);
        assert_eq!(whole_years(index, NaiveDate::from_ymd_opt(2000, 3, 20).unwrap()), 10);
    }
}
