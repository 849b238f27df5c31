use chrono::NaiveDate;
use ehrql_dialect::{add_months, add_years, whole_months, whole_years};
use proptest::prelude::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn month_addition_boundary_cases() {
    assert_eq!(add_months(date(2020, 1, 31), 1), date(2020, 2, 29));
    assert_eq!(add_months(date(2021, 1, 31), 1), date(2021, 2, 28));
}

#[test]
fn year_addition_boundary_cases() {
    assert_eq!(add_years(date(2020, 2, 29), 1), date(2021, 3, 1));
    assert_eq!(add_years(date(2020, 2, 29), 4), date(2024, 2, 29));
}

#[test]
fn year_difference_boundary_case() {
    assert_eq!(whole_years(date(2020, 3, 2), date(2000, 9, 2)), 19);
}

proptest! {
    #[test]
    fn adding_then_subtracting_months_is_the_identity_within_a_day(
        year in 1950i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
        offset in -240i64..240,
    ) {
        let start = date(year, month, day);
        let shifted = add_months(start, offset);
        let back = add_months(shifted, -offset);
        prop_assert_eq!(back, start);
    }

    #[test]
    fn whole_years_never_exceeds_the_naive_calendar_year_gap(
        year_a in 1950i32..2100,
        year_b in 1950i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
    ) {
        let a = date(year_a, month, day);
        let b = date(year_b, month, day);
        let diff = whole_years(a, b);
        prop_assert_eq!(diff, i64::from(year_a - year_b));
    }

    #[test]
    fn whole_months_agrees_with_sign_of_the_underlying_dates(
        year_a in 1950i32..2100,
        month_a in 1u32..=12,
        year_b in 1950i32..2100,
        month_b in 1u32..=12,
    ) {
        let a = date(year_a, month_a, 1);
        let b = date(year_b, month_b, 1);
        let diff = whole_months(a, b);
        if a > b {
            prop_assert!(diff >= 0);
        } else if a < b {
            prop_assert!(diff <= 0);
        } else {
            prop_assert_eq!(diff, 0);
        }
    }
}
