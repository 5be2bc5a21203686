use chrono::{Datelike, Duration, NaiveDate};

/// Today's date on the local calendar.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Format a date as `YYYY-MM-DD`.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// The `days` calendar days ending at (and including) `today`, newest first.
pub fn trailing_days(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days as i64).map(|i| today - Duration::days(i)).collect()
}

/// Week number counted from January 1st with Monday as the first weekday.
///
/// Week 1 runs from Jan 1 to the first Sunday, so a year can reach week 54.
/// This is not the ISO week: the year is always the calendar year.
pub fn week_of_year(d: NaiveDate) -> u32 {
    let jan1 = NaiveDate::from_ymd_opt(d.year(), 1, 1).unwrap_or(d);
    let offset = jan1.weekday().num_days_from_monday();
    (d.ordinal0() + offset) / 7 + 1
}

/// Strip markdown code fences from LLM responses.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```text") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = s.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        s
    }
}
