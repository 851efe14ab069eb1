//! Calendar month addressing for the grid and the balance chain.

use chrono::Datelike;

use crate::error::{FinTableError, Result};

/// Number of months in a year.
pub const MONTHS_PER_YEAR: u32 = 12;

/// A calendar month of a given year.
///
/// Periods order chronologically (year first, then month), which is the
/// order the running balance is carried forward in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    /// Calendar year.
    year: i32,
    /// Month number, `1..=12`.
    month: u32,
}

impl Period {
    /// Creates a period after validating the month number.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if `month` is outside `1..=12`.
    #[inline]
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=MONTHS_PER_YEAR).contains(&month) {
            return Err(FinTableError::Validation(format!("invalid month: {month}")));
        }
        Ok(Self { year, month })
    }

    /// January of the given year.
    #[inline]
    #[must_use]
    pub const fn january(year: i32) -> Self {
        Self { year, month: 1 }
    }

    /// December of the given year.
    #[inline]
    #[must_use]
    pub const fn december(year: i32) -> Self {
        Self {
            year,
            month: MONTHS_PER_YEAR,
        }
    }

    /// The period containing the given date.
    #[inline]
    #[must_use]
    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Calendar year.
    #[inline]
    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month number, `1..=12`.
    #[inline]
    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// The immediately preceding month; January rolls back to December of
    /// the prior year.
    #[inline]
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self::december(self.year - 1)
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The immediately following month; December rolls over to January of
    /// the next year.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == MONTHS_PER_YEAR {
            Self::january(self.year + 1)
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Iterates every period from `from` to `to`, both inclusive, in
    /// chronological order. Empty when `from > to`.
    #[inline]
    #[must_use]
    pub const fn range(from: Self, to: Self) -> PeriodRange {
        PeriodRange {
            next: Some(from),
            end: to,
        }
    }

    /// All twelve months of `year`.
    #[inline]
    #[must_use]
    pub const fn year_range(year: i32) -> PeriodRange {
        Self::range(Self::january(year), Self::december(year))
    }

    /// Legacy `month + year` string key, e.g. `"12023"` for January 2023.
    #[inline]
    #[must_use]
    pub fn composite_date(self) -> String {
        super::composite_date(self.month, self.year)
    }
}

impl core::fmt::Display for Period {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}.{}", self.month, self.year)
    }
}

/// Inclusive chronological iterator over periods, see [`Period::range`].
#[derive(Debug, Clone)]
pub struct PeriodRange {
    /// Next period to yield, `None` once exhausted.
    next: Option<Period>,
    /// Last period to yield.
    end: Period,
}

impl Iterator for PeriodRange {
    type Item = Period;

    #[inline]
    fn next(&mut self) -> Option<Period> {
        let current = self.next.filter(|period| *period <= self.end)?;
        self.next = (current < self.end).then(|| current.next());
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn rejects_invalid_months() {
        assert!(matches!(
            Period::new(2023, 0),
            Err(FinTableError::Validation(_))
        ));
        assert!(matches!(
            Period::new(2023, 13),
            Err(FinTableError::Validation(_))
        ));
        assert!(Period::new(2023, 12).is_ok());
    }

    #[test]
    fn previous_and_next_roll_the_year() {
        let jan = Period::january(2024);
        assert_eq!(jan.previous(), Period::december(2023));
        assert_eq!(Period::december(2023).next(), jan);
        let may = Period::new(2024, 5).unwrap();
        assert_eq!(may.previous().month(), 4);
        assert_eq!(may.next().month(), 6);
    }

    #[test]
    fn orders_chronologically() {
        let dec = Period::december(2022);
        let jan = Period::january(2023);
        assert!(dec < jan);
        assert!(Period::new(2023, 2).unwrap() > jan);
    }

    #[test]
    fn range_crosses_year_boundary() {
        let from = Period::new(2022, 11).unwrap();
        let to = Period::new(2023, 2).unwrap();
        let months: Vec<(i32, u32)> = Period::range(from, to)
            .map(|period| (period.year(), period.month()))
            .collect();
        assert_eq!(months, vec![(2022, 11), (2022, 12), (2023, 1), (2023, 2)]);
    }

    #[test]
    fn range_single_and_empty() {
        let jan = Period::january(2023);
        assert_eq!(Period::range(jan, jan).count(), 1);
        assert_eq!(Period::range(jan.next(), jan).count(), 0);
        assert_eq!(Period::year_range(2023).count(), 12);
    }

    #[test]
    fn composite_date_matches_legacy_format() {
        assert_eq!(Period::january(2023).composite_date(), "12023");
        assert_eq!(Period::december(2023).composite_date(), "122023");
    }

    #[test]
    fn from_date_and_display() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let period = Period::from_date(&date);
        assert_eq!(period, Period::new(2023, 3).unwrap());
        assert_eq!(period.to_string(), "03.2023");
    }
}
