use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::date_util::week_of_year;
use crate::error::{Error, Result};
use crate::types::ReportKind;

static RE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// The cache partition a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePeriod {
    Day(NaiveDate),
    Week(i32, u32),
    Month(i32, u32),
    Year(i32),
}

impl CachePeriod {
    /// The period covering `today` at the cadence of `kind`.
    pub fn current(kind: ReportKind, today: NaiveDate) -> Self {
        match kind {
            ReportKind::Daily => CachePeriod::Day(today),
            ReportKind::Weekly => CachePeriod::Week(today.year(), week_of_year(today)),
            ReportKind::Monthly => CachePeriod::Month(today.year(), today.month()),
            ReportKind::Yearly | ReportKind::Fraud | ReportKind::Cyber => {
                CachePeriod::Year(today.year())
            }
        }
    }

    /// Parse a period key.
    ///
    /// Supported formats:
    /// - `2025-03-14`: day
    /// - `2025-W05`: week counted from January 1st
    /// - `2025-03`: month
    /// - `2025`: year
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(caps) = RE_DAY.captures(s) {
            let year: i32 = caps[1].parse().unwrap_or_default();
            let month: u32 = caps[2].parse().unwrap_or_default();
            let day: u32 = caps[3].parse().unwrap_or_default();
            return NaiveDate::from_ymd_opt(year, month, day)
                .map(CachePeriod::Day)
                .ok_or_else(|| Error::PeriodParse(format!("invalid date: {s}")));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = caps[1].parse().unwrap_or_default();
            let week: u32 = caps[2].parse().unwrap_or_default();
            if (1..=54).contains(&week) {
                return Ok(CachePeriod::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap_or_default();
            let month: u32 = caps[2].parse().unwrap_or_default();
            if (1..=12).contains(&month) {
                return Ok(CachePeriod::Month(year, month));
            }
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(CachePeriod::Year(year));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Convert to the canonical key string used in cache keys.
    pub fn to_key(&self) -> String {
        match self {
            CachePeriod::Day(d) => d.format("%Y-%m-%d").to_string(),
            CachePeriod::Week(y, w) => format!("{y}-W{w:02}"),
            CachePeriod::Month(y, m) => format!("{y}-{m:02}"),
            CachePeriod::Year(y) => format!("{y}"),
        }
    }

    /// Returns true if this is the period `kind` would use today.
    pub fn is_current_for(&self, kind: ReportKind, today: NaiveDate) -> bool {
        *self == CachePeriod::current(kind, today)
    }
}

impl std::fmt::Display for CachePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.to_key())
    }
}
