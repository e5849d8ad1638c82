//! Dates, period arithmetic and day count conventions.
//!
//! This module provides:
//! - `Date`: Type-safe date wrapper around chrono::NaiveDate with year/day
//!   period arithmetic and a weekends-only business day adjustment
//! - `DayCountConvention`: Actual/Actual (ISDA), Actual/365 (Fixed), Actual/360
//!
//! # Examples
//!
//! ```
//! use xva_core::types::time::{Date, DayCountConvention};
//!
//! let start = Date::from_ymd(2024, 1, 1).unwrap();
//! let end = Date::from_ymd(2024, 7, 1).unwrap();
//!
//! // 2024 is a leap year: 182 days / 366
//! let yf = DayCountConvention::ActualActualIsda.year_fraction(start, end);
//! assert!((yf - 182.0 / 366.0).abs() < 1e-12);
//! ```

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;

use super::error::DateError;

/// Calendar date used for cube grids, maturities and curve lookups.
///
/// Subtracting two dates yields the signed number of calendar days.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Date(NaiveDate);

impl Date {
    /// Create a date from year, month and day components.
    ///
    /// # Errors
    ///
    /// Returns `DateError::InvalidDate` for impossible dates such as 2024-02-30.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DateError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date)
            .ok_or(DateError::InvalidDate { year, month, day })
    }

    /// Parse an ISO 8601 date string (`YYYY-MM-DD`).
    pub fn parse(s: &str) -> Result<Self, DateError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Date)
            .map_err(|e| DateError::ParseError(e.to_string()))
    }

    /// Underlying chrono date.
    #[inline]
    pub fn into_inner(self) -> NaiveDate {
        self.0
    }

    /// Year component.
    #[inline]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month component (1-12).
    #[inline]
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Day-of-month component (1-31).
    #[inline]
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Shift by a signed number of calendar days.
    pub fn add_days(self, days: i64) -> Result<Self, DateError> {
        let shifted = if days >= 0 {
            self.0.checked_add_days(Days::new(days.unsigned_abs()))
        } else {
            self.0.checked_sub_days(Days::new(days.unsigned_abs()))
        };
        shifted
            .map(Date)
            .ok_or_else(|| DateError::OutOfRange(format!("{} {:+}D", self, days)))
    }

    /// Shift by a number of years.
    ///
    /// A 29 February start rolls back to 28 February in non-leap years.
    pub fn add_years(self, years: i32) -> Result<Self, DateError> {
        let months = Months::new(12 * years.unsigned_abs());
        let shifted = if years >= 0 {
            self.0.checked_add_months(months)
        } else {
            self.0.checked_sub_months(months)
        };
        shifted
            .map(Date)
            .ok_or_else(|| DateError::OutOfRange(format!("{} {:+}Y", self, years)))
    }

    /// True on Saturdays and Sundays.
    #[inline]
    pub fn is_weekend(&self) -> bool {
        matches!(self.0.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Roll forward to the next business day of a weekends-only calendar
    /// (following convention). Business days are returned unchanged.
    pub fn adjust_weekends_following(self) -> Result<Self, DateError> {
        let mut date = self;
        while date.is_weekend() {
            date = date.add_days(1)?;
        }
        Ok(date)
    }
}

impl Sub for Date {
    type Output = i64;

    fn sub(self, other: Self) -> i64 {
        (self.0 - other.0).num_days()
    }
}

impl FromStr for Date {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, DateError> {
        Date::parse(s)
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Self {
        Date(date)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Day count conventions for year fraction calculation.
///
/// # Variants
/// - `ActualActualIsda`: actual days, split by calendar year, over the
///   actual length of each year
/// - `Actual365Fixed`: actual days / 365
/// - `Actual360`: actual days / 360
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DayCountConvention {
    /// Actual/Actual (ISDA).
    #[default]
    ActualActualIsda,

    /// Actual/365 (Fixed).
    Actual365Fixed,

    /// Actual/360.
    Actual360,
}

impl DayCountConvention {
    /// Market name of the convention.
    pub fn name(&self) -> &'static str {
        match self {
            DayCountConvention::ActualActualIsda => "ACT/ACT",
            DayCountConvention::Actual365Fixed => "ACT/365",
            DayCountConvention::Actual360 => "ACT/360",
        }
    }

    /// Year fraction between two dates.
    ///
    /// The result is signed: `year_fraction(a, b) == -year_fraction(b, a)`.
    pub fn year_fraction(&self, start: Date, end: Date) -> f64 {
        let days = end - start;
        match self {
            DayCountConvention::Actual365Fixed => days as f64 / 365.0,
            DayCountConvention::Actual360 => days as f64 / 360.0,
            DayCountConvention::ActualActualIsda => {
                if start > end {
                    return -act_act_isda(end, start);
                }
                act_act_isda(start, end)
            }
        }
    }
}

fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

fn act_act_isda(start: Date, end: Date) -> f64 {
    if start == end {
        return 0.0;
    }
    let y1 = start.year();
    let y2 = end.year();
    // Day of year is 1-based; subtracting start's ordinal keeps it exclusive.
    let before = f64::from(start.0.ordinal() - 1);
    let after = f64::from(end.0.ordinal() - 1);
    f64::from(y2 - y1) - before / days_in_year(y1) + after / days_in_year(y2)
}

impl FromStr for DayCountConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace(['/', ' ', '(', ')'], "").as_str() {
            "ACTACT" | "ACTUALACTUAL" | "ACTACTISDA" | "ACTUALACTUALISDA" => {
                Ok(DayCountConvention::ActualActualIsda)
            }
            "ACT365" | "ACT365F" | "ACT365FIXED" | "ACTUAL365FIXED" | "A365" => {
                Ok(DayCountConvention::Actual365Fixed)
            }
            "ACT360" | "ACTUAL360" | "A360" => Ok(DayCountConvention::Actual360),
            _ => Err(format!("Unknown day count convention: {}", s)),
        }
    }
}

impl fmt::Display for DayCountConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::DayCountConvention;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    impl Serialize for DayCountConvention {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(self.name())
        }
    }

    impl<'de> Deserialize<'de> for DayCountConvention {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            DayCountConvention::from_str(&s).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> Date {
        Date::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn test_invalid_date() {
        assert_eq!(
            Date::from_ymd(2023, 2, 29),
            Err(DateError::InvalidDate {
                year: 2023,
                month: 2,
                day: 29
            })
        );
    }

    #[test]
    fn test_parse_and_display() {
        let d: Date = "2024-03-15".parse().unwrap();
        assert_eq!(d, date(2024, 3, 15));
        assert_eq!(d.to_string(), "2024-03-15");
        assert!(Date::parse("15/03/2024").is_err());
    }

    #[test]
    fn test_add_days_crosses_year() {
        assert_eq!(date(2024, 12, 30).add_days(4).unwrap(), date(2025, 1, 3));
        assert_eq!(date(2025, 1, 3).add_days(-4).unwrap(), date(2024, 12, 30));
    }

    #[test]
    fn test_add_years_end_of_february() {
        assert_eq!(date(2024, 2, 29).add_years(1).unwrap(), date(2025, 2, 28));
        assert_eq!(date(2023, 6, 30).add_years(1).unwrap(), date(2024, 6, 30));
    }

    #[test]
    fn test_weekend_adjustment() {
        // 2024-01-06 is a Saturday
        assert_eq!(
            date(2024, 1, 6).adjust_weekends_following().unwrap(),
            date(2024, 1, 8)
        );
        assert_eq!(
            date(2024, 1, 5).adjust_weekends_following().unwrap(),
            date(2024, 1, 5)
        );
    }

    #[test]
    fn test_act_act_isda_within_year() {
        let yf = DayCountConvention::ActualActualIsda.year_fraction(date(2023, 1, 1), date(2023, 7, 1));
        assert_relative_eq!(yf, 181.0 / 365.0, epsilon = 1e-14);
    }

    #[test]
    fn test_act_act_isda_across_years() {
        // 2023-11-01 -> 2024-03-01: 61 days in 2023, 60 days in 2024
        let yf = DayCountConvention::ActualActualIsda.year_fraction(date(2023, 11, 1), date(2024, 3, 1));
        assert_relative_eq!(yf, 61.0 / 365.0 + 60.0 / 366.0, epsilon = 1e-14);
    }

    #[test]
    fn test_act_act_isda_one_year() {
        let yf = DayCountConvention::ActualActualIsda.year_fraction(date(2024, 1, 1), date(2025, 1, 1));
        assert_relative_eq!(yf, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_act_365_and_360() {
        let start = date(2024, 1, 1);
        let end = date(2024, 7, 1);
        assert_relative_eq!(
            DayCountConvention::Actual365Fixed.year_fraction(start, end),
            182.0 / 365.0
        );
        assert_relative_eq!(
            DayCountConvention::Actual360.year_fraction(start, end),
            182.0 / 360.0
        );
    }

    #[test]
    fn test_from_str_and_display() {
        assert_eq!(
            "A365".parse::<DayCountConvention>().unwrap(),
            DayCountConvention::Actual365Fixed
        );
        assert_eq!(
            "Actual/Actual (ISDA)".parse::<DayCountConvention>().unwrap(),
            DayCountConvention::ActualActualIsda
        );
        assert!("30/360".parse::<DayCountConvention>().is_err());
        assert_eq!(DayCountConvention::Actual360.to_string(), "ACT/360");
    }

    proptest! {
        #[test]
        fn prop_act_act_is_antisymmetric(a in 0i64..20_000, b in 0i64..20_000) {
            let base = date(1990, 1, 1);
            let d1 = base.add_days(a).unwrap();
            let d2 = base.add_days(b).unwrap();
            let dc = DayCountConvention::ActualActualIsda;
            prop_assert!((dc.year_fraction(d1, d2) + dc.year_fraction(d2, d1)).abs() < 1e-12);
        }

        #[test]
        fn prop_act_act_is_additive(a in 0i64..5_000, b in 0i64..5_000, c in 0i64..5_000) {
            let base = date(2000, 3, 1);
            let d1 = base.add_days(a).unwrap();
            let d2 = d1.add_days(b).unwrap();
            let d3 = d2.add_days(c).unwrap();
            let dc = DayCountConvention::ActualActualIsda;
            let whole = dc.year_fraction(d1, d3);
            let parts = dc.year_fraction(d1, d2) + dc.year_fraction(d2, d3);
            prop_assert!((whole - parts).abs() < 1e-10);
        }
    }
}
