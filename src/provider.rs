//! Collaborator interfaces for embedding and paraphrasing
//!
//! The pipeline only talks to these traits. Concrete HTTP clients live in
//! [`crate::cohere`] and [`crate::openai`]; [`create_embedder`] and
//! [`create_paraphraser`] pick one from a [`ProviderConfig`].

use crate::cache::EmbeddingCache;
use crate::cohere::{CohereEmbedder, CohereParaphraser};
use crate::error::{Error, Result};
use crate::openai::{OpenAIEmbedder, OpenAIParaphraser};
use crate::types::{EmbeddingVector, ProviderConfig};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Maps texts to embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. The result has the same length and order as
    /// `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
}

/// Rewrites text to be shorter
#[async_trait]
pub trait ParaphraseProvider: Send + Sync {
    /// Rewrite `text` following `instructions`. `max_tokens_hint` is the
    /// budget the rewrite should aim for; it is not guaranteed to be met.
    async fn rewrite(&self, text: &str, instructions: &str, max_tokens_hint: usize)
        -> Result<String>;
}

/// Read-through cache in front of another embedding provider.
///
/// Texts already in the cache are served locally. The remaining texts are
/// de-duplicated and sent in a single request, then written to the cache.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Provider behind the cache
    pub fn inner(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut resolved: Vec<Option<EmbeddingVector>> =
            texts.iter().map(|text| self.cache.get(text)).collect();

        let mut seen = HashSet::new();
        let uncached: Vec<String> = texts
            .iter()
            .zip(&resolved)
            .filter(|(text, vector)| vector.is_none() && seen.insert(text.as_str()))
            .map(|(text, _)| text.clone())
            .collect();

        if !uncached.is_empty() {
            debug!(
                "Embedding {} uncached text(s), {} served from cache",
                uncached.len(),
                texts.len() - resolved.iter().filter(|v| v.is_none()).count()
            );

            let vectors = self.inner.embed(&uncached).await?;
            check_vector_count(vectors.len(), uncached.len())?;

            let fetched: HashMap<String, EmbeddingVector> =
                uncached.into_iter().zip(vectors).collect();
            for (text, slot) in texts.iter().zip(resolved.iter_mut()) {
                if slot.is_none() {
                    *slot = fetched.get(text).cloned();
                }
            }
            for (text, vector) in fetched {
                self.cache.insert(text, vector);
            }
        }

        resolved
            .into_iter()
            .map(|vector| {
                vector.ok_or_else(|| {
                    Error::ProviderError("Embedding missing for requested text".to_string())
                })
            })
            .collect()
    }
}

/// Create an embedding provider from configuration
pub fn create_embedder(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.provider.as_str() {
        "cohere" => Ok(Arc::new(CohereEmbedder::new(config.clone())?)),
        "openai" | "ollama" | "lm-studio" | "openai-compatible" => {
            Ok(Arc::new(OpenAIEmbedder::new(config.clone())?))
        }
        other => Err(Error::ConfigError(format!(
            "Unsupported embedding provider: {}",
            other
        ))),
    }
}

/// Create a paraphrase provider from configuration
pub fn create_paraphraser(config: &ProviderConfig) -> Result<Arc<dyn ParaphraseProvider>> {
    config.validate()?;
    match config.provider.as_str() {
        "cohere" => Ok(Arc::new(CohereParaphraser::new(config.clone())?)),
        "openai" | "ollama" | "lm-studio" | "openai-compatible" => {
            Ok(Arc::new(OpenAIParaphraser::new(config.clone())?))
        }
        other => Err(Error::ConfigError(format!(
            "Unsupported paraphrase provider: {}",
            other
        ))),
    }
}

/// System prompt sent with every rewrite request
pub fn rewrite_system_prompt(instructions: &str) -> String {
    let mut prompt = String::from(
        "Rewrite the following prompt to fit within the token budget, preserving all key \
         instructions and meaning. Be as concise as possible.",
    );
    if !instructions.trim().is_empty() {
        prompt.push_str("\nAdditional instructions: ");
        prompt.push_str(instructions.trim());
    }
    prompt
}

pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<Client> {
    Ok(Client::builder().timeout(config.timeout()).build()?)
}

/// Join a base URL and an endpoint path
pub(crate) fn endpoint(config: &ProviderConfig, path: &str) -> String {
    format!("{}/{}", config.api_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into a provider error carrying the body
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(Error::ProviderError(format!(
        "API request failed with status {}: {}",
        status, error_text
    )))
}

pub(crate) fn check_vector_count(received: usize, requested: usize) -> Result<()> {
    if received != requested {
        return Err(Error::ProviderError(format!(
            "Provider returned {} embeddings for {} inputs",
            received, requested
        )));
    }
    Ok(())
}

/// Trim a rewrite and reject empty output
pub(crate) fn clean_rewrite(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::ProviderError("Provider returned an empty rewrite".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Embeds a text as [length, 1.0] and records every batch it receives
    struct RecordingEmbedder {
        batches: Mutex<Vec<Vec<String>>>,
        calls: AtomicUsize,
    }

    impl RecordingEmbedder {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(texts.to_vec());
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            Ok(vec![vec![1.0]])
        }
    }

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cached_embedder_reads_through() {
        let inner = Arc::new(RecordingEmbedder::new());
        let cache = Arc::new(EmbeddingCache::new());
        let embedder = CachedEmbedder::new(inner.clone(), cache.clone());

        let first = embedder.embed(&strings(&["query", "a", "bb"])).await.unwrap();
        assert_eq!(first, vec![vec![5.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]);
        assert_eq!(cache.len(), 3);

        let second = embedder.embed(&strings(&["bb", "ccc"])).await.unwrap();
        assert_eq!(second, vec![vec![2.0, 1.0], vec![3.0, 1.0]]);

        let batches = inner.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1], strings(&["ccc"]));
    }

    #[tokio::test]
    async fn test_cached_embedder_skips_fully_cached_batch() {
        let inner = Arc::new(RecordingEmbedder::new());
        let cache = Arc::new(EmbeddingCache::new());
        cache.insert("x".to_string(), vec![9.0]);
        let embedder = CachedEmbedder::new(inner.clone(), cache);

        let vectors = embedder.embed(&strings(&["x", "x"])).await.unwrap();
        assert_eq!(vectors, vec![vec![9.0], vec![9.0]]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cached_embedder_dedupes_batch() {
        let inner = Arc::new(RecordingEmbedder::new());
        let embedder = CachedEmbedder::new(inner.clone(), Arc::new(EmbeddingCache::new()));

        let vectors = embedder.embed(&strings(&["same", "same", "other"])).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(inner.batches.lock().unwrap()[0], strings(&["same", "other"]));
    }

    #[tokio::test]
    async fn test_cached_embedder_rejects_short_response() {
        let embedder =
            CachedEmbedder::new(Arc::new(ShortEmbedder), Arc::new(EmbeddingCache::new()));
        let err = embedder.embed(&strings(&["a", "b"])).await.unwrap_err();
        assert!(err.is_provider_error());
    }

    #[test]
    fn test_rewrite_system_prompt() {
        let plain = rewrite_system_prompt("");
        assert!(plain.ends_with("Be as concise as possible."));

        let extra = rewrite_system_prompt("Keep the JSON schema.");
        assert!(extra.ends_with("\nAdditional instructions: Keep the JSON schema."));
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("  short text \n").unwrap(), "short text");
        assert!(clean_rewrite(" \n ").unwrap_err().is_provider_error());
    }

    #[test]
    fn test_endpoint_join() {
        let config = ProviderConfig::cohere_embed("k", "m");
        assert_eq!(endpoint(&config, "/v1/embed"), "https://api.cohere.ai/v1/embed");
    }

    #[test]
    fn test_factory_rejects_missing_key_and_unknown_provider() {
        let missing = ProviderConfig::cohere_embed("", "embed-english-v3.0");
        assert!(create_embedder(&missing).err().unwrap().is_config_error());

        let unknown = ProviderConfig::new("mystery", "http://localhost", "key", "model");
        assert!(create_paraphraser(&unknown).err().unwrap().is_config_error());

        assert!(create_paraphraser(&ProviderConfig::ollama("llama3", None)).is_ok());
    }
}
