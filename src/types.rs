use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::{date_key, trailing_days};
use crate::error::Error;

/// One of the six supported feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Fraud,
    Cyber,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Daily,
        ReportKind::Weekly,
        ReportKind::Monthly,
        ReportKind::Yearly,
        ReportKind::Fraud,
        ReportKind::Cyber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Weekly => "weekly",
            ReportKind::Monthly => "monthly",
            ReportKind::Yearly => "yearly",
            ReportKind::Fraud => "fraud",
            ReportKind::Cyber => "cyber",
        }
    }

    /// Human-readable heading used by the CLI.
    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Daily => "Daily Brief",
            ReportKind::Weekly => "Weekly Risks",
            ReportKind::Monthly => "Monthly Risks",
            ReportKind::Yearly => "Yearly Risks",
            ReportKind::Fraud => "Fraud Events",
            ReportKind::Cyber => "Cybersecurity Incidents",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(ReportKind::Daily),
            "weekly" | "week" => Ok(ReportKind::Weekly),
            "monthly" | "month" => Ok(ReportKind::Monthly),
            "yearly" | "year" => Ok(ReportKind::Yearly),
            "fraud" => Ok(ReportKind::Fraud),
            "cyber" | "cybersecurity" => Ok(ReportKind::Cyber),
            other => Err(Error::UnknownReport(other.to_string())),
        }
    }
}

/// A grounding citation returned alongside an AI response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// A single risk, headline, or incident as persisted in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// A risk decorated for presentation. `is_new` is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRisk {
    #[serde(flatten)]
    pub risk: Risk,
    #[serde(rename = "isNew")]
    pub is_new: bool,
}

impl DisplayRisk {
    pub fn new(risk: Risk) -> Self {
        Self { risk, is_new: false }
    }

    pub fn fresh(risk: Risk) -> Self {
        Self { risk, is_new: true }
    }
}

/// Daily headlines keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyBrief(BTreeMap<String, Vec<Risk>>);

impl DailyBrief {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: &str) -> Option<&Vec<Risk>> {
        self.0.get(date)
    }

    pub fn insert(&mut self, date: String, risks: Vec<Risk>) {
        self.0.insert(date, risks);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Drop every date outside the `days`-long window ending at `today`.
    /// Keys that are not dates at all are dropped too.
    pub fn prune(&mut self, today: NaiveDate, days: u32) {
        let keep: Vec<String> = trailing_days(today, days).into_iter().map(date_key).collect();
        self.0.retain(|date, _| keep.contains(date));
    }

    /// Dates with their headlines, newest first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = (&String, &Vec<Risk>)> {
        self.0.iter().rev()
    }

    pub fn dates(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(title: &str) -> Risk {
        Risk {
            title: title.to_string(),
            summary: "s".to_string(),
            sources: vec![],
            date: None,
            link: None,
        }
    }

    #[test]
    fn test_report_kind_parse() {
        assert_eq!("Daily".parse::<ReportKind>().unwrap(), ReportKind::Daily);
        assert_eq!("cybersecurity".parse::<ReportKind>().unwrap(), ReportKind::Cyber);
        assert!(matches!(
            "hourly".parse::<ReportKind>(),
            Err(Error::UnknownReport(_))
        ));
        for kind in ReportKind::ALL {
            assert_eq!(kind.as_str().parse::<ReportKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_risk_json_omits_absent_optionals() {
        let json = serde_json::to_string(&risk("A")).unwrap();
        assert_eq!(json, r#"{"title":"A","summary":"s","sources":[]}"#);
    }

    #[test]
    fn test_risk_json_without_sources() {
        let r: Risk = serde_json::from_str(r#"{"title":"A","summary":"B"}"#).unwrap();
        assert!(r.sources.is_empty());
        assert_eq!(r.date, None);
    }

    #[test]
    fn test_display_risk_flag_is_presentation_only() {
        let json = serde_json::to_value(DisplayRisk::fresh(risk("A"))).unwrap();
        assert_eq!(json["isNew"], true);
        assert_eq!(json["title"], "A");
        // The persisted type has no way to carry the flag
        let back: Risk = serde_json::from_value(json).unwrap();
        let persisted = serde_json::to_string(&back).unwrap();
        assert!(!persisted.contains("isNew"));
    }

    #[test]
    fn test_daily_brief_prune() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut brief = DailyBrief::new();
        for d in ["2025-03-10", "2025-03-04", "2025-03-03", "2025-02-01", "garbage"] {
            brief.insert(d.to_string(), vec![risk(d)]);
        }
        brief.prune(today, 7);
        let dates: Vec<&String> = brief.dates().collect();
        assert_eq!(dates, vec!["2025-03-04", "2025-03-10"]);
    }

    #[test]
    fn test_daily_brief_newest_first() {
        let mut brief = DailyBrief::new();
        brief.insert("2025-03-01".into(), vec![]);
        brief.insert("2025-03-03".into(), vec![]);
        brief.insert("2025-03-02".into(), vec![]);
        let order: Vec<&String> = brief.iter_newest_first().map(|(d, _)| d).collect();
        assert_eq!(order, vec!["2025-03-03", "2025-03-02", "2025-03-01"]);
    }
}
