pub mod parse;

use crate::date_util::strip_code_fences;
use crate::error::{Error, Result};
use crate::llm::RiskQueryApi;
use crate::types::{ReportKind, Risk};

pub use parse::{dedupe_sources, parse_blocks, BlockFormat};

/// Number of items requested for the briefing feeds.
pub const ITEMS_PER_BRIEF: usize = 5;

const RISK_FORMAT: &str = "Title: [The Risk Title]\nSummary: [The Risk Summary]";

/// The labeled-field layout a report's response uses.
pub fn block_format(kind: ReportKind) -> BlockFormat {
    match kind {
        ReportKind::Daily => BlockFormat::Headline,
        _ => BlockFormat::Risk,
    }
}

/// Build the prompt for `kind`. `known_titles` are asked to be skipped so
/// repeated searches surface new items.
pub fn build_prompt(kind: ReportKind, known_titles: &[String]) -> String {
    let n = ITEMS_PER_BRIEF;
    let mut prompt = match kind {
        ReportKind::Daily => format!(
            "Identify and extract the top {n} trending global news headlines from today relevant to executive decision-makers. \
             For each headline, provide the original title, a one-paragraph summary, its publication date, and a direct link to the article. \
             Format each headline as follows, and separate each with '---':\n\n\
             Title: [The Headline Title]\nSummary: [The Headline Summary]\nDate: [Publication Date, e.g., YYYY-MM-DD]\nLink: [Direct URL to the article]"
        ),
        ReportKind::Weekly => format!(
            "Identify and summarize the top {n} strategic executive risks from the past 7 days, \
             focusing on significant events and emerging trends in geopolitics, macroeconomics, and technology. \
             For each risk, provide a concise title and a one-paragraph summary. \
             Format each risk as follows, and separate each risk with '---':\n\n{RISK_FORMAT}"
        ),
        ReportKind::Monthly => format!(
            "Identify and summarize the top {n} strategic executive risks from the past 30 days, \
             focusing on major developments and long-term implications in geopolitics, macroeconomics, technological disruption, and climate change. \
             For each risk, provide a concise title and a one-paragraph summary. \
             Format each risk as follows, and separate each risk with '---':\n\n{RISK_FORMAT}"
        ),
        ReportKind::Yearly => format!(
            "Identify and summarize the top {n} strategic executive risks for the current year, \
             focusing on long-term trends in geopolitics, macroeconomics, technological disruption, climate change, and social shifts. \
             For each risk, provide a concise title and a one-paragraph summary. \
             Format each risk as follows, and separate each risk with '---':\n\n{RISK_FORMAT}"
        ),
        ReportKind::Fraud => "Identify and list the most newsworthy corporate or financial fraud events primarily related to the US \
             that have occurred or come to light this year. \
             For each event, provide a title identifying the event and a concise one-sentence summary of the incident. \
             Format each event as follows, and separate each with '---':\n\n\
             Title: [The Fraud Event Title, e.g., \"Company X Accounting Scandal\"]\nSummary: [A single sentence summarizing the fraud.]"
            .to_string(),
        ReportKind::Cyber => "Identify and list the most newsworthy cybersecurity incidents (e.g., data breaches, ransomware attacks) \
             that have occurred or been disclosed this year. \
             For each incident, provide a title identifying the event and a concise one-sentence summary. \
             Format each event as follows, and separate each with '---':\n\n\
             Title: [The Incident Title, e.g., \"Tech Giant Data Breach\"]\nSummary: [A single sentence summarizing the incident.]"
            .to_string(),
    };

    if !known_titles.is_empty() {
        prompt.push_str("\n\nThese have already been reported; list only events not among them:\n");
        for title in known_titles {
            prompt.push_str("- ");
            prompt.push_str(title);
            prompt.push('\n');
        }
    }
    prompt
}

/// Send `prompt` and parse the answer as `format` blocks.
///
/// Every returned risk carries the response's deduplicated citations.
/// Zero parsed items is an error, never an empty success.
pub async fn run_query(
    api: &dyn RiskQueryApi,
    prompt: &str,
    format: BlockFormat,
) -> Result<Vec<Risk>> {
    let response = api.query(prompt).await?;
    let text = strip_code_fences(&response.text);
    let mut risks = parse_blocks(text, format)?;
    if risks.is_empty() {
        return Err(Error::EmptyResult);
    }

    let sources = dedupe_sources(&response.citations);
    log::debug!("Parsed {} items and {} sources", risks.len(), sources.len());
    for risk in &mut risks {
        risk.sources = sources.clone();
    }
    Ok(risks)
}

/// Prefix used when a fetch failure is shown to the user.
pub fn failure_context(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Fraud => "Failed to fetch fraud events",
        ReportKind::Cyber => "Failed to fetch cybersecurity incidents",
        _ => "Failed to fetch risks",
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use crate::error::{Error, Result};
    use crate::llm::{GroundingCitation, QueryResponse, RiskQueryApi};

    /// Replays canned responses in order and records every prompt.
    #[derive(Default)]
    pub struct ScriptedApi {
        responses: RefCell<VecDeque<Result<QueryResponse>>>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl ScriptedApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.responses.borrow_mut().push_back(Ok(QueryResponse {
                text: text.to_string(),
                citations: Vec::new(),
            }));
            self
        }

        pub fn reply_cited(self, text: &str, citations: Vec<GroundingCitation>) -> Self {
            self.responses.borrow_mut().push_back(Ok(QueryResponse {
                text: text.to_string(),
                citations,
            }));
            self
        }

        pub fn fail(self, message: &str) -> Self {
            self.responses
                .borrow_mut()
                .push_back(Err(Error::Network(message.to_string())));
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.borrow().len()
        }
    }

    #[async_trait(?Send)]
    impl RiskQueryApi for ScriptedApi {
        async fn query(&self, prompt: &str) -> Result<QueryResponse> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Network("no scripted response left".into())))
        }
    }

    /// `Title: X\nSummary: ...` blocks for each title.
    pub fn blocks(titles: &[&str]) -> String {
        titles
            .iter()
            .map(|t| format!("Title: {t}\nSummary: About {t}."))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{blocks, ScriptedApi};
    use super::*;
    use crate::llm::GroundingCitation;

    async fn query_kind(api: &ScriptedApi, kind: ReportKind) -> Result<Vec<Risk>> {
        run_query(api, &build_prompt(kind, &[]), block_format(kind)).await
    }

    #[test]
    fn test_prompts_request_fixed_format() {
        for kind in ReportKind::ALL {
            let prompt = build_prompt(kind, &[]);
            assert!(prompt.contains("'---'"), "{kind} prompt lacks separator");
            assert!(prompt.contains("Title: ["), "{kind} prompt lacks Title label");
            assert!(prompt.contains("Summary: ["), "{kind} prompt lacks Summary label");
        }
        assert!(build_prompt(ReportKind::Daily, &[]).contains("Link: ["));
        assert!(build_prompt(ReportKind::Weekly, &[]).contains("top 5"));
    }

    #[test]
    fn test_prompt_lists_known_titles() {
        let prompt = build_prompt(ReportKind::Fraud, &["A".to_string(), "B".to_string()]);
        assert!(prompt.contains("- A\n- B\n"));
        assert!(!build_prompt(ReportKind::Fraud, &[]).contains("already been reported"));
    }

    #[tokio::test]
    async fn test_run_query_attaches_sources() {
        let api = ScriptedApi::new().reply_cited(
            &blocks(&["A", "B"]),
            vec![
                GroundingCitation {
                    uri: Some("https://x.example".into()),
                    title: Some("x".into()),
                },
                GroundingCitation {
                    uri: Some("https://x.example".into()),
                    title: Some("dup".into()),
                },
            ],
        );
        let risks = query_kind(&api, ReportKind::Weekly).await.unwrap();
        assert_eq!(risks.len(), 2);
        for r in &risks {
            assert_eq!(r.sources.len(), 1);
            assert_eq!(r.sources[0].title, "x");
        }
    }

    #[tokio::test]
    async fn test_run_query_strips_code_fences() {
        let api = ScriptedApi::new().reply("```\nTitle: A\nSummary: B\n```");
        let risks = query_kind(&api, ReportKind::Yearly).await.unwrap();
        assert_eq!(risks[0].title, "A");
        assert_eq!(risks[0].summary, "B");
    }

    #[tokio::test]
    async fn test_run_query_empty_is_error() {
        let api = ScriptedApi::new().reply("---\n\n---");
        let err = query_kind(&api, ReportKind::Monthly).await.unwrap_err();
        assert!(matches!(err, Error::EmptyResult));
        assert_eq!(err.to_string(), "AI returned an empty list of items.");
    }

    #[tokio::test]
    async fn test_run_query_propagates_network_error() {
        let api = ScriptedApi::new().fail("connection reset");
        let err = query_kind(&api, ReportKind::Cyber).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_failure_context() {
        assert_eq!(failure_context(ReportKind::Daily), "Failed to fetch risks");
        assert_eq!(failure_context(ReportKind::Fraud), "Failed to fetch fraud events");
    }
}
