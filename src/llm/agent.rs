use async_trait::async_trait;

use super::{QueryResponse, RiskQueryApi};
use crate::error::{Error, Result};

/// Queries through a mixtape agent. These providers return no citations.
pub struct AgentClient {
    agent: mixtape_core::Agent,
}

impl AgentClient {
    pub fn new(agent: mixtape_core::Agent) -> Self {
        Self { agent }
    }
}

#[async_trait(?Send)]
impl RiskQueryApi for AgentClient {
    async fn query(&self, prompt: &str) -> Result<QueryResponse> {
        let response = self
            .agent
            .run(prompt)
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        Ok(QueryResponse {
            text: response.text().trim().to_string(),
            citations: Vec::new(),
        })
    }
}

pub(crate) async fn build_agent(provider: &str, model_name: &str) -> Result<mixtape_core::Agent> {
    // Each combination needs its own builder call since the model types are different.
    match (provider, model_name) {
        ("bedrock", "claude-haiku-4-5" | "haiku") => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("bedrock", _) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", "claude-haiku-4-5" | "haiku") => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", _) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        (other, _) => Err(Error::Config(format!("unknown llm_provider: {other}"))),
    }
}
