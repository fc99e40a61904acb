//! Calendar time as typed, comparable values.
//!
//! A [`Temporal`] is a day, an ISO week, a month or a year. Every value has a
//! canonical string form (`YYYY-MM-DD`, `YYYY-Www`, `YYYY-MM`, `YYYY`) that
//! round-trips through [`Temporal::parse`] and `Display`. Values of the same
//! kind are totally ordered and can be stepped by whole units, which is what
//! turns sparse server responses into dense, gap-free series.
//!
//! An unknown or missing date is represented as `Option<Temporal>::None`.
//! `Option`'s ordering puts `None` before every concrete value, which is the
//! sort rule used throughout the engine.
//!
//! ## Example
//!
//! ```rust
//! use surveil_query::temporal::{generate_all_in_range, Temporal, TemporalKind};
//!
//! let min = Temporal::parse(TemporalKind::Month, "2023-11").unwrap();
//! let max = Temporal::parse(TemporalKind::Month, "2024-02").unwrap();
//!
//! let months: Vec<String> = generate_all_in_range(min, max)
//!     .unwrap()
//!     .iter()
//!     .map(ToString::to_string)
//!     .collect();
//! assert_eq!(months, ["2023-11", "2023-12", "2024-01", "2024-02"]);
//! ```

mod cache;

pub use cache::TemporalCache;

use chrono::{Datelike, Days, Months, NaiveDate, TimeDelta, Weekday};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};

static_regex!(DAY_PATTERN, r"^(\d{4})-(\d{2})-(\d{2})$");
static_regex!(WEEK_PATTERN, r"^(\d{4})-W(\d{2})$");
static_regex!(MONTH_PATTERN, r"^(\d{4})-(\d{2})$");
static_regex!(YEAR_PATTERN, r"^(\d{4})$");

/// Canonical strings carry exactly four year digits.
const MIN_YEAR: i32 = 0;
const MAX_YEAR: i32 = 9999;

/// The calendar unit of a temporal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalKind {
    Day,
    Week,
    Month,
    Year,
}

impl TemporalKind {
    /// Human-readable canonical pattern for this kind.
    pub fn pattern(&self) -> &'static str {
        match self {
            TemporalKind::Day => "YYYY-MM-DD",
            TemporalKind::Week => "YYYY-Www",
            TemporalKind::Month => "YYYY-MM",
            TemporalKind::Year => "YYYY",
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            TemporalKind::Day => &DAY_PATTERN,
            TemporalKind::Week => &WEEK_PATTERN,
            TemporalKind::Month => &MONTH_PATTERN,
            TemporalKind::Year => &YEAR_PATTERN,
        }
    }
}

impl fmt::Display for TemporalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemporalKind::Day => "day",
            TemporalKind::Week => "week",
            TemporalKind::Month => "month",
            TemporalKind::Year => "year",
        };
        f.write_str(name)
    }
}

/// An ISO-8601 week, stored as the Monday it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearWeek {
    monday: NaiveDate,
}

impl YearWeek {
    /// ISO week-numbering year (may differ from the calendar year of the Monday).
    pub fn iso_year(&self) -> i32 {
        self.monday.iso_week().year()
    }

    /// Week number within the ISO year, `1..=53`.
    pub fn week(&self) -> u32 {
        self.monday.iso_week().week()
    }

    /// The Monday this week starts on.
    pub fn first_day(&self) -> NaiveDate {
        self.monday
    }
}

/// A calendar month, stored as its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    first_day: NaiveDate,
}

impl YearMonth {
    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// Month number, `1..=12`.
    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    fn month_index(&self) -> i64 {
        i64::from(self.year()) * 12 + i64::from(self.month0())
    }

    fn month0(&self) -> u32 {
        self.first_day.month0()
    }
}

/// A calendar year, stored as January 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Year {
    first_day: NaiveDate,
}

impl Year {
    pub fn year(&self) -> i32 {
        self.first_day.year()
    }
}

/// A day, week, month or year.
///
/// Values of one kind compare chronologically. Comparing values of different
/// kinds is deterministic but carries no calendar meaning; callers must not mix
/// kinds inside one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Temporal {
    Day(NaiveDate),
    Week(YearWeek),
    Month(YearMonth),
    Year(Year),
}

impl Temporal {
    /// Creates a day, validating the calendar date.
    pub fn day(year: i32, month: u32, day: u32) -> QueryResult<Self> {
        let input = format!("{year:04}-{month:02}-{day:02}");
        check_year(TemporalKind::Day, year, &input)?;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Temporal::Day)
            .ok_or_else(|| QueryError::invalid_temporal(TemporalKind::Day, input, "no such date"))
    }

    /// Creates an ISO week.
    pub fn week(iso_year: i32, week: u32) -> QueryResult<Self> {
        let input = format!("{iso_year:04}-W{week:02}");
        check_year(TemporalKind::Week, iso_year, &input)?;
        NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon)
            .map(|monday| Temporal::Week(YearWeek { monday }))
            .ok_or_else(|| {
                QueryError::invalid_temporal(TemporalKind::Week, input, "no such ISO week")
            })
    }

    /// Creates a month.
    pub fn month(year: i32, month: u32) -> QueryResult<Self> {
        let input = format!("{year:04}-{month:02}");
        check_year(TemporalKind::Month, year, &input)?;
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Temporal::Month(YearMonth { first_day }))
            .ok_or_else(|| {
                QueryError::invalid_temporal(TemporalKind::Month, input, "month out of range")
            })
    }

    /// Creates a year.
    pub fn year(year: i32) -> QueryResult<Self> {
        let input = format!("{year:04}");
        check_year(TemporalKind::Year, year, &input)?;
        NaiveDate::from_ymd_opt(year, 1, 1)
            .map(|first_day| Temporal::Year(Year { first_day }))
            .ok_or_else(|| QueryError::invalid_temporal(TemporalKind::Year, input, "no such year"))
    }

    /// Wraps a calendar date.
    pub fn from_date(date: NaiveDate) -> QueryResult<Self> {
        Self::day(date.year(), date.month(), date.day())
    }

    /// Parses the canonical string form of the given kind.
    ///
    /// No coercion is applied: `2023-1-5` is not a day, and `2023-01` is not
    /// accepted where a day is expected.
    pub fn parse(kind: TemporalKind, input: &str) -> QueryResult<Self> {
        let captures = kind.regex().captures(input).ok_or_else(|| {
            QueryError::invalid_temporal(kind, input, format!("expected {}", kind.pattern()))
        })?;

        let number = |index: usize| -> QueryResult<u32> {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .ok_or_else(|| QueryError::invalid_temporal(kind, input, "malformed number"))
        };
        // The pattern guarantees four digits, which always fit.
        let year = number(1)? as i32;

        let value = match kind {
            TemporalKind::Day => Self::day(year, number(2)?, number(3)?),
            TemporalKind::Week => Self::week(year, number(2)?),
            TemporalKind::Month => Self::month(year, number(2)?),
            TemporalKind::Year => Self::year(year),
        };
        value.map_err(|err| match err {
            QueryError::InvalidTemporalFormat { reason, .. } => {
                QueryError::invalid_temporal(kind, input, reason)
            }
            other => other,
        })
    }

    /// Returns the kind whose canonical pattern `input` matches, if any.
    pub fn detect_kind(input: &str) -> Option<TemporalKind> {
        [
            TemporalKind::Day,
            TemporalKind::Week,
            TemporalKind::Month,
            TemporalKind::Year,
        ]
        .into_iter()
        .find(|kind| kind.regex().is_match(input))
    }

    pub fn kind(&self) -> TemporalKind {
        match self {
            Temporal::Day(_) => TemporalKind::Day,
            Temporal::Week(_) => TemporalKind::Week,
            Temporal::Month(_) => TemporalKind::Month,
            Temporal::Year(_) => TemporalKind::Year,
        }
    }

    /// First calendar day covered by this value.
    pub fn first_day(&self) -> NaiveDate {
        match self {
            Temporal::Day(date) => *date,
            Temporal::Week(week) => week.monday,
            Temporal::Month(month) => month.first_day,
            Temporal::Year(year) => year.first_day,
        }
    }

    /// Last calendar day covered by this value.
    pub fn last_day(&self) -> NaiveDate {
        match self {
            Temporal::Day(date) => *date,
            Temporal::Week(week) => week.monday + Days::new(6),
            Temporal::Month(month) => day_before_months_later(month.first_day, 1),
            Temporal::Year(year) => day_before_months_later(year.first_day, 12),
        }
    }

    /// Adds `n` units of this value's kind. `n` may be negative.
    pub fn add_units(&self, n: i64) -> QueryResult<Self> {
        let out_of_range = || {
            QueryError::invalid_temporal(
                self.kind(),
                self.to_string(),
                format!("adding {n} units leaves the supported range"),
            )
        };

        match self {
            Temporal::Day(date) => {
                let shifted = TimeDelta::try_days(n)
                    .and_then(|delta| date.checked_add_signed(delta))
                    .ok_or_else(out_of_range)?;
                Self::from_date(shifted).map_err(|_| out_of_range())
            }
            Temporal::Week(week) => {
                let shifted = n
                    .checked_mul(7)
                    .and_then(TimeDelta::try_days)
                    .and_then(|delta| week.monday.checked_add_signed(delta))
                    .ok_or_else(out_of_range)?;
                let iso = shifted.iso_week();
                Self::week(iso.year(), iso.week()).map_err(|_| out_of_range())
            }
            Temporal::Month(month) => {
                let index = month.month_index().checked_add(n).ok_or_else(out_of_range)?;
                let year = i32::try_from(index.div_euclid(12)).map_err(|_| out_of_range())?;
                let month0 = index.rem_euclid(12) as u32;
                Self::month(year, month0 + 1).map_err(|_| out_of_range())
            }
            Temporal::Year(year) => {
                let shifted = i64::from(year.year())
                    .checked_add(n)
                    .and_then(|y| i32::try_from(y).ok())
                    .ok_or_else(out_of_range)?;
                Self::year(shifted).map_err(|_| out_of_range())
            }
        }
    }

    /// The next value of the same kind.
    pub fn successor(&self) -> QueryResult<Self> {
        self.add_units(1)
    }

    /// The previous value of the same kind.
    pub fn predecessor(&self) -> QueryResult<Self> {
        self.add_units(-1)
    }

    /// Number of units from `other` to `self` (`self - other`).
    pub fn difference(&self, other: &Temporal) -> QueryResult<i64> {
        match (self, other) {
            (Temporal::Day(a), Temporal::Day(b)) => Ok((*a - *b).num_days()),
            (Temporal::Week(a), Temporal::Week(b)) => Ok((a.monday - b.monday).num_days() / 7),
            (Temporal::Month(a), Temporal::Month(b)) => Ok(a.month_index() - b.month_index()),
            (Temporal::Year(a), Temporal::Year(b)) => {
                Ok(i64::from(a.year()) - i64::from(b.year()))
            }
            _ => Err(QueryError::TemporalKindMismatch {
                left: self.kind(),
                right: other.kind(),
            }),
        }
    }

    /// Converts to the containing value of a coarser (or equal) kind.
    ///
    /// Days convert to any kind, weeks to their ISO year, months to their year.
    pub fn to_kind(&self, kind: TemporalKind) -> QueryResult<Self> {
        if self.kind() == kind {
            return Ok(*self);
        }
        let mismatch = || QueryError::TemporalKindMismatch {
            left: self.kind(),
            right: kind,
        };

        match (self, kind) {
            (Temporal::Day(date), TemporalKind::Week) => {
                let iso = date.iso_week();
                Self::week(iso.year(), iso.week())
            }
            (Temporal::Day(date), TemporalKind::Month) => Self::month(date.year(), date.month()),
            (Temporal::Day(date), TemporalKind::Year) => Self::year(date.year()),
            (Temporal::Week(week), TemporalKind::Year) => Self::year(week.iso_year()),
            (Temporal::Month(month), TemporalKind::Year) => Self::year(month.year()),
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporal::Day(date) => {
                write!(f, "{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
            }
            Temporal::Week(week) => write!(f, "{:04}-W{:02}", week.iso_year(), week.week()),
            Temporal::Month(month) => write!(f, "{:04}-{:02}", month.year(), month.month()),
            Temporal::Year(year) => write!(f, "{:04}", year.year()),
        }
    }
}

impl FromStr for Temporal {
    type Err = QueryError;

    fn from_str(input: &str) -> QueryResult<Self> {
        match Temporal::detect_kind(input) {
            Some(kind) => Temporal::parse(kind, input),
            None => Err(QueryError::invalid_temporal(
                None::<TemporalKind>,
                input,
                "expected one of YYYY-MM-DD, YYYY-Www, YYYY-MM, YYYY",
            )),
        }
    }
}

impl Serialize for Temporal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Temporal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Every value from `min` to `max` inclusive, strictly increasing.
///
/// The result has `max.difference(min) + 1` elements; it is empty when
/// `min > max`. Both bounds must be of the same kind.
pub fn generate_all_in_range(min: Temporal, max: Temporal) -> QueryResult<Vec<Temporal>> {
    let span = max.difference(&min)?;
    if span < 0 {
        return Ok(Vec::new());
    }

    let mut values = Vec::with_capacity(span as usize + 1);
    let mut current = min;
    values.push(current);
    for _ in 0..span {
        current = current.successor()?;
        values.push(current);
    }
    Ok(values)
}

/// Smallest and largest concrete value, ignoring unknown dates.
pub fn min_max<'a, I>(values: I) -> Option<(Temporal, Temporal)>
where
    I: IntoIterator<Item = &'a Option<Temporal>>,
{
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, value| match acc {
            None => Some((*value, *value)),
            Some((min, max)) => Some((min.min(*value), max.max(*value))),
        })
}

fn check_year(kind: TemporalKind, year: i32, input: &str) -> QueryResult<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(QueryError::invalid_temporal(
            kind,
            input,
            format!("year must be between {MIN_YEAR} and {MAX_YEAR}"),
        ))
    }
}

/// The day before `first_day` shifted by `months`.
///
/// Supported years end at 9999, well inside chrono's range, so the shift
/// cannot overflow.
fn day_before_months_later(first_day: NaiveDate, months: u32) -> NaiveDate {
    first_day
        .checked_add_months(Months::new(months))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}
