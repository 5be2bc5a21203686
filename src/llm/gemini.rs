//! Minimal client for the Gemini `generateContent` endpoint with Google
//! Search grounding turned on.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{GroundingCitation, QueryResponse, RiskQueryApi};
use crate::error::{Error, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: &str) -> Result<Self> {
        let endpoint = Url::parse(BASE_URL)
            .and_then(|base| base.join(&format!("models/{model}:generateContent")))
            .map_err(|e| Error::Config(format!("invalid model name {model}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Read the key from `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn from_env(model: &str) -> Result<Self> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| Error::Config("GEMINI_API_KEY is not set".into()))?;
        Self::new(key, model)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait(?Send)]
impl RiskQueryApi for GeminiClient {
    async fn query(&self, prompt: &str) -> Result<QueryResponse> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };

        log::debug!("POST {}", self.endpoint);
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(Error::Network(format!("Gemini returned {status}: {message}")));
        }

        decode_response(&raw)
    }
}

/// Turn a `generateContent` response body into text plus citations.
pub(crate) fn decode_response(raw: &str) -> Result<QueryResponse> {
    let parsed: GenerateResponse = serde_json::from_str(raw)
        .map_err(|e| Error::Network(format!("unexpected Gemini response: {e}")))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(Error::Network("Gemini returned no candidates".into()));
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let citations = candidate
        .grounding_metadata
        .map(|m| m.grounding_chunks)
        .unwrap_or_default()
        .into_iter()
        .map(|chunk| match chunk.web {
            Some(web) => GroundingCitation {
                uri: web.uri,
                title: web.title,
            },
            None => GroundingCitation::default(),
        })
        .collect();

    Ok(QueryResponse { text, citations })
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_model() {
        let client = GeminiClient::new("k", "gemini-2.5-flash").unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_enables_search() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some("hi".into()),
                }],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert!(json["tools"][0]["google_search"].is_object());
    }

    #[test]
    fn test_decode_response_with_grounding() {
        let raw = r#"{
          "candidates": [{
            "content": {"parts": [{"text": "Title: A\n"}, {"text": "Summary: B"}], "role": "model"},
            "groundingMetadata": {
              "groundingChunks": [
                {"web": {"uri": "https://a.example", "title": "a.example"}},
                {"web": {"uri": "https://b.example"}},
                {"retrievedContext": {}}
              ]
            }
          }]
        }"#;
        let resp = decode_response(raw).unwrap();
        assert_eq!(resp.text, "Title: A\nSummary: B");
        assert_eq!(resp.citations.len(), 3);
        assert_eq!(resp.citations[0].title.as_deref(), Some("a.example"));
        assert_eq!(resp.citations[1].title, None);
        assert_eq!(resp.citations[2], GroundingCitation::default());
    }

    #[test]
    fn test_decode_response_without_grounding() {
        let raw = r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}}]}"#;
        let resp = decode_response(raw).unwrap();
        assert_eq!(resp.text, "x");
        assert!(resp.citations.is_empty());
    }

    #[test]
    fn test_decode_response_no_candidates() {
        assert!(matches!(
            decode_response(r#"{"candidates": []}"#),
            Err(Error::Network(_))
        ));
        assert!(matches!(decode_response("not json"), Err(Error::Network(_))));
    }
}
