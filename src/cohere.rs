//! Cohere embedding and generation clients

use crate::error::{Error, Result};
use crate::provider::{
    build_http_client, check_vector_count, clean_rewrite, endpoint, ensure_success,
    rewrite_system_prompt, EmbeddingProvider, ParaphraseProvider,
};
use crate::types::{EmbeddingVector, ProviderConfig};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Input type required by the v3 embedding models
const EMBED_INPUT_TYPE: &str = "search_document";

/// Rewrites stop at the first blank line
const STOP_SEQUENCES: &[&str] = &["\n\n"];

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<EmbeddingVector>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    stop_sequences: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    text: String,
}

/// Cohere `/v1/embed` client
pub struct CohereEmbedder {
    config: ProviderConfig,
    client: Client,
}

impl CohereEmbedder {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Cohere embed: {} text(s) with {}", texts.len(), self.config.model);

        let request = EmbedRequest {
            texts,
            model: &self.config.model,
            input_type: EMBED_INPUT_TYPE,
        };
        let response = self
            .client
            .post(endpoint(&self.config, "v1/embed"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let parsed: EmbedResponse = ensure_success(response).await?.json().await?;
        check_vector_count(parsed.embeddings.len(), texts.len())?;
        Ok(parsed.embeddings)
    }
}

/// Cohere `/v1/generate` client used for paraphrasing
pub struct CohereParaphraser {
    config: ProviderConfig,
    client: Client,
}

impl CohereParaphraser {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ParaphraseProvider for CohereParaphraser {
    async fn rewrite(
        &self,
        text: &str,
        instructions: &str,
        max_tokens_hint: usize,
    ) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: format!("{}\n\nPROMPT:\n{}", rewrite_system_prompt(instructions), text),
            max_tokens: max_tokens_hint.max(1),
            temperature: self.config.temperature,
            stop_sequences: STOP_SEQUENCES,
        };
        let response = self
            .client
            .post(endpoint(&self.config, "v1/generate"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let parsed: GenerateResponse = ensure_success(response).await?.json().await?;
        let generation = parsed
            .generations
            .first()
            .ok_or_else(|| Error::ProviderError("No generations in response".to_string()))?;
        clean_rewrite(&generation.text)
    }
}
