//! Calendar months and the month/year that a monthly budget file name refers to.

use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Month {
    January = 1,
    February = 2,
    March = 3,
    April = 4,
    May = 5,
    June = 6,
    July = 7,
    August = 8,
    September = 9,
    October = 10,
    November = 11,
    December = 12,
}

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

impl Month {
    /// All months in calendar order.
    pub fn all() -> &'static [Month] {
        &MONTHS
    }

    /// The month number, 1 through 12.
    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(n: u32) -> Option<Month> {
        MONTHS.get((n as usize).checked_sub(1)?).copied()
    }

    /// The English month name, e.g. `January`.
    pub fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Parses a full or abbreviated English month name, ignoring case. `Sept` is accepted.
    pub fn from_name(s: &str) -> Option<Month> {
        let lower = s.trim().to_lowercase();
        if lower == "sept" {
            return Some(Month::September);
        }
        MONTHS.iter().copied().find(|m| {
            let name = m.name().to_lowercase();
            lower == name || (lower.len() == 3 && name.starts_with(&lower))
        })
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Word-bounded month names and abbreviations.
static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b",
    )
    .expect("month regex is valid")
});

/// A four digit year in the 1900s or 2000s standing on its own.
static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex is valid"));

/// The period a monthly budget refers to.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
)]
pub struct MonthYear {
    // field order matters for Ord: year first
    year: i32,
    month: Month,
}

impl MonthYear {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    /// Creates a `MonthYear` from a month number, failing if it is not 1 through 12.
    pub fn from_numbers(year: i32, month: u32) -> crate::Result<Self> {
        match Month::from_number(month) {
            Some(m) => Ok(Self::new(year, m)),
            None => bail!("Invalid month {month}, expected 1 through 12"),
        }
    }

    /// Extracts the month and year from a file name like `Monthly budget Jan 2025`. Returns `None`
    /// if the name lacks either a month or a year.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let year: i32 = YEAR_RE.captures(name)?.get(1)?.as_str().parse().ok()?;
        let month = Month::from_name(MONTH_RE.captures(name)?.get(1)?.as_str())?;
        Some(Self::new(year, month))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }
}

impl Display for MonthYear {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:02}", self.year, self.month.number())
    }
}
