//! Core types for promptfit

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::tokenizer::EstimatorKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Budget used when the caller does not supply one
pub const DEFAULT_MAX_TOKENS: usize = 4096;
/// Default Cohere embedding model
pub const DEFAULT_EMBED_MODEL: &str = "embed-english-v3.0";
/// Default Cohere generation model used for paraphrasing
pub const DEFAULT_LLM_MODEL: &str = "command";

const COHERE_BASE_URL: &str = "https://api.cohere.ai";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Fixed-length vector representing a piece of text
pub type EmbeddingVector = Vec<f32>;

/// Similarity between a segment and a query; higher is more relevant
pub type RelevanceScore = f32;

/// A sentence-level unit of a prompt, in original order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    index: usize,
    text: String,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Position in the original ordering
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl AsRef<str> for Segment {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// How a paraphrase retry loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    /// An attempt met the budget
    Satisfied,
    /// Retries ran out; the best attempt was returned
    Exhausted,
    /// The caller cancelled; the best attempt was returned
    Cancelled,
}

/// One round-trip of the paraphrase loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParaphraseAttempt {
    /// 1-based attempt number
    pub number: u32,
    /// Text sent to the provider
    pub sent: String,
    /// Text received, `None` when the provider failed
    pub received: Option<String>,
    /// Estimated tokens of `received`
    pub tokens: Option<usize>,
    /// Whether `received` fits the budget
    pub satisfied: bool,
}

impl ParaphraseAttempt {
    pub fn rewritten(
        number: u32,
        sent: String,
        received: String,
        tokens: usize,
        budget: usize,
    ) -> Self {
        Self {
            number,
            sent,
            received: Some(received),
            tokens: Some(tokens),
            satisfied: tokens <= budget,
        }
    }

    pub fn failed(number: u32, sent: String) -> Self {
        Self {
            number,
            sent,
            received: None,
            tokens: None,
            satisfied: false,
        }
    }
}

/// Which path the pipeline took to produce its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum OptimizationStage {
    /// Prompt was already within budget and returned untouched
    Passthrough,
    /// Relevance pruning alone met the budget
    Pruned,
    /// Pruned text was handed to the paraphrase loop
    Paraphrased { status: RetryStatus, attempts: u32 },
}

/// Result of prompt optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Optimized prompt
    pub text: String,
    /// Budget the prompt was fitted to
    pub budget: usize,
    /// Estimated tokens across the original segments
    pub original_tokens: usize,
    /// Estimated tokens of `text`
    pub final_tokens: usize,
    /// Number of segments the prompt split into
    pub segment_count: usize,
    /// Number of segments kept by relevance pruning
    pub selected_segments: usize,
    pub stage: OptimizationStage,
}

impl OptimizationResult {
    pub fn within_budget(&self) -> bool {
        self.final_tokens <= self.budget
    }

    /// Final tokens over original tokens (1.0 when nothing was removed)
    pub fn compression_ratio(&self) -> f64 {
        if self.original_tokens == 0 {
            1.0
        } else {
            self.final_tokens as f64 / self.original_tokens as f64
        }
    }
}

/// API provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("cohere", "openai", "ollama", ...)
    pub provider: String,
    /// Base URL of the API
    pub api_url: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Sampling temperature for rewriting
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    pub fn new(provider: &str, api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Cohere embeddings (`/v1/embed`)
    pub fn cohere_embed(api_key: &str, model: &str) -> Self {
        Self::new("cohere", COHERE_BASE_URL, api_key, model)
    }

    /// Cohere generation (`/v1/generate`)
    pub fn cohere_generate(api_key: &str, model: &str) -> Self {
        Self::new("cohere", COHERE_BASE_URL, api_key, model)
    }

    pub fn openai_embed(api_key: &str, model: &str) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key, model)
    }

    pub fn openai_chat(api_key: &str, model: &str) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key, model)
    }

    /// Local Ollama through its OpenAI-compatible endpoints
    pub fn ollama(model: &str, base_url: Option<&str>) -> Self {
        let url = base_url.unwrap_or(OLLAMA_BASE_URL).trim_end_matches('/');
        Self::new("ollama", &format!("{}/v1", url), "", model)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Local servers run without credentials
    pub fn requires_api_key(&self) -> bool {
        !matches!(self.provider.as_str(), "ollama" | "lm-studio")
    }

    /// Fails with a configuration error when a required key is missing
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::ConfigError(format!(
                "{} provider requires a model name",
                self.provider
            )));
        }
        if self.requires_api_key() && self.api_key.trim().is_empty() {
            return Err(Error::ConfigError(format!(
                "{} provider requires an API key",
                self.provider
            )));
        }
        Ok(())
    }
}

/// Configuration for prompt optimization
#[derive(Debug, Clone)]
pub struct PromptFitConfig {
    /// Budget used by `optimize_with_default_budget`
    pub default_max_tokens: usize,
    /// Embedding provider used for relevance ranking
    pub embedding: ProviderConfig,
    /// Rewrite provider used for paraphrase compression
    pub paraphrase: ProviderConfig,
    /// Paraphrase retry and backoff policy
    pub retry: RetryPolicy,
    /// Keep only this many ranked segments (unbounded when `None`)
    pub top_k: Option<usize>,
    /// Token estimator
    pub estimator: EstimatorKind,
}

impl Default for PromptFitConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
            embedding: ProviderConfig::cohere_embed("", DEFAULT_EMBED_MODEL),
            paraphrase: ProviderConfig::cohere_generate("", DEFAULT_LLM_MODEL),
            retry: RetryPolicy::default(),
            top_k: None,
            estimator: EstimatorKind::Approximate,
        }
    }
}

impl PromptFitConfig {
    /// Build a Cohere-backed configuration from the environment.
    ///
    /// `COHERE_API_KEY` is required. `PROMPTFIT_MAX_TOKENS`,
    /// `PROMPTFIT_EMBED_MODEL`, `PROMPTFIT_LLM_MODEL` and
    /// `PROMPTFIT_MAX_RETRIES` override the defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("COHERE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::ConfigError("COHERE_API_KEY is not set".to_string()))?;

        let embed_model = env::var("PROMPTFIT_EMBED_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        let llm_model =
            env::var("PROMPTFIT_LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());

        let mut config = Self::default()
            .with_embedding(ProviderConfig::cohere_embed(&api_key, &embed_model))
            .with_paraphrase(ProviderConfig::cohere_generate(&api_key, &llm_model));

        if let Some(max_tokens) = env_override::<usize>("PROMPTFIT_MAX_TOKENS")? {
            config.default_max_tokens = max_tokens;
        }
        if let Some(max_retries) = env_override::<u32>("PROMPTFIT_MAX_RETRIES")? {
            config.retry.max_retries = max_retries;
        }

        Ok(config)
    }

    pub fn with_default_max_tokens(mut self, max_tokens: usize) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn with_embedding(mut self, embedding: ProviderConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_paraphrase(mut self, paraphrase: ProviderConfig) -> Self {
        self.paraphrase = paraphrase;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.estimator = estimator;
        self
    }
}

fn env_override<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::ConfigError(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
