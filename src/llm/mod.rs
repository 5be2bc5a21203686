pub mod agent;
pub mod gemini;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

pub use agent::AgentClient;
pub use gemini::GeminiClient;

pub const DEFAULT_PROVIDER: &str = "gemini";

/// A citation as reported by the provider, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingCitation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// Text answer plus whatever web citations backed it.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub text: String,
    pub citations: Vec<GroundingCitation>,
}

/// A text-in, text-out generative model with web search enabled.
#[async_trait(?Send)]
pub trait RiskQueryApi {
    async fn query(&self, prompt: &str) -> Result<QueryResponse>;
}

/// Create a query client configured from the database's LLM settings.
pub async fn create_client(db: &Database) -> Result<Box<dyn RiskQueryApi>> {
    let (provider, model) = db
        .reader()
        .call(|conn| {
            let provider = repository::get_config(conn, "llm_provider")?;
            let model = repository::get_config(conn, "llm_model")?;
            Ok::<(Option<String>, Option<String>), rusqlite::Error>((provider, model))
        })
        .await?;

    let provider = provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
    log::debug!("Using LLM provider {provider}");

    match provider {
        "gemini" => {
            let model = model.as_deref().unwrap_or(gemini::DEFAULT_MODEL);
            Ok(Box::new(GeminiClient::from_env(model)?))
        }
        "anthropic" | "bedrock" => {
            let model = model.as_deref().unwrap_or("claude-sonnet-4-5");
            Ok(Box::new(AgentClient::new(agent::build_agent(provider, model).await?)))
        }
        other => Err(Error::Config(format!("unknown llm_provider: {other}"))),
    }
}
