//! OpenAI-compatible clients (OpenAI, Ollama, LM Studio, ...)

use crate::error::{Error, Result};
use crate::provider::{
    build_http_client, check_vector_count, clean_rewrite, endpoint, ensure_success,
    rewrite_system_prompt, EmbeddingProvider, ParaphraseProvider,
};
use crate::types::{EmbeddingVector, ProviderConfig};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: EmbeddingVector,
    index: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

fn authorized(config: &ProviderConfig, request: RequestBuilder) -> RequestBuilder {
    if config.api_key.is_empty() {
        request
    } else {
        request.bearer_auth(&config.api_key)
    }
}

/// `/embeddings` client
pub struct OpenAIEmbedder {
    config: ProviderConfig,
    client: Client,
}

impl OpenAIEmbedder {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("OpenAI embed: {} text(s) with {}", texts.len(), self.config.model);

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };
        let response = authorized(
            &self.config,
            self.client.post(endpoint(&self.config, "embeddings")),
        )
        .json(&request)
        .send()
        .await?;

        let mut parsed: EmbeddingResponse = ensure_success(response).await?.json().await?;
        check_vector_count(parsed.data.len(), texts.len())?;
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// `/chat/completions` client used for paraphrasing
pub struct OpenAIParaphraser {
    config: ProviderConfig,
    client: Client,
}

impl OpenAIParaphraser {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ParaphraseProvider for OpenAIParaphraser {
    async fn rewrite(
        &self,
        text: &str,
        instructions: &str,
        max_tokens_hint: usize,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: rewrite_system_prompt(instructions),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: max_tokens_hint.max(1),
        };
        let response = authorized(
            &self.config,
            self.client.post(endpoint(&self.config, "chat/completions")),
        )
        .json(&request)
        .send()
        .await?;

        let parsed: ChatResponse = ensure_success(response).await?.json().await?;
        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| Error::ProviderError("No response from API".to_string()))?;
        clean_rewrite(&choice.message.content)
    }
}
