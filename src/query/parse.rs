use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::llm::GroundingCitation;
use crate::types::{Risk, Source};

pub const RECORD_SEPARATOR: &str = "---";
pub const NO_SUMMARY: &str = "No summary available.";
pub const UNTITLED_SOURCE: &str = "Untitled Source";

/// Matches `Label: value` at the start of a line. Leading bullets, numbered
/// list markers (`1.`, `2)`) and markdown emphasis around the label are tolerated.
static RE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[\s>*_#-]*(?:\d+[.)])?[\s>*_#-]*(Title|Summary|Date|Link)[*_]*\s*:[*_]*[ \t]*(.*?)\s*$",
    )
    .unwrap()
});

/// Which labeled fields a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    /// `Title:` and `Summary:` only.
    Risk,
    /// `Title:`, `Summary:`, `Date:` and `Link:`.
    Headline,
}

impl BlockFormat {
    pub fn untitled(&self) -> &'static str {
        match self {
            BlockFormat::Risk => "Untitled Risk",
            BlockFormat::Headline => "Untitled Headline",
        }
    }
}

#[derive(Default)]
struct Fields {
    title: Option<String>,
    summary: Option<String>,
    date: Option<String>,
    link: Option<String>,
}

impl Fields {
    fn any(&self) -> bool {
        self.title.is_some() || self.summary.is_some() || self.date.is_some() || self.link.is_some()
    }
}

fn extract_fields(block: &str) -> Fields {
    let mut fields = Fields::default();
    for caps in RE_FIELD.captures_iter(block) {
        let value = caps[2].trim_end_matches(['*', '_']).trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &caps[1] {
            "Title" => &mut fields.title,
            "Summary" => &mut fields.summary,
            "Date" => &mut fields.date,
            _ => &mut fields.link,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    fields
}

/// Split a response into records on `---` and read their labeled fields.
///
/// Blocks with no labeled field at all are treated as model chatter and
/// skipped. Returned records carry no sources yet.
pub fn parse_blocks(text: &str, format: BlockFormat) -> Result<Vec<Risk>> {
    let blocks: Vec<&str> = text
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();

    let mut risks = Vec::new();
    for block in &blocks {
        let fields = extract_fields(block);
        if !fields.any() {
            log::debug!("Skipping block without labeled fields: {block:.60}");
            continue;
        }
        let (date, link) = match format {
            BlockFormat::Risk => (None, None),
            BlockFormat::Headline => (
                fields.date,
                fields
                    .link
                    .map(|l| l.trim_start_matches('<').trim_end_matches('>').to_string()),
            ),
        };
        risks.push(Risk {
            title: fields.title.unwrap_or_else(|| format.untitled().to_string()),
            summary: fields.summary.unwrap_or_else(|| NO_SUMMARY.to_string()),
            sources: Vec::new(),
            date,
            link,
        });
    }

    if risks.is_empty() && !blocks.is_empty() {
        return Err(Error::Parse(format!(
            "none of {} blocks had a Title or Summary line. The format might have changed.",
            blocks.len()
        )));
    }
    Ok(risks)
}

/// Collapse citations to one per URI, keeping the first title seen.
pub fn dedupe_sources(citations: &[GroundingCitation]) -> Vec<Source> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for c in citations {
        let uri = match c.uri.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u,
            _ => continue,
        };
        if !seen.insert(uri.to_string()) {
            continue;
        }
        let title = c
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_SOURCE);
        sources.push(Source {
            uri: uri.to_string(),
            title: title.to_string(),
        });
    }
    sources
}
