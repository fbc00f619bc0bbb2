//! Prompt optimization pipeline
//!
//! 1. Split the prompt into sentence segments
//! 2. Return it untouched if it already fits the budget
//! 3. Rank segments against the query by embedding similarity
//! 4. Greedily keep the most relevant segments that fit
//! 5. If the joined result is still over budget, paraphrase it

use crate::cache::EmbeddingCache;
use crate::error::Result;
use crate::provider::{
    create_embedder, create_paraphraser, CachedEmbedder, EmbeddingProvider, ParaphraseProvider,
};
use crate::relevance::rank_segments;
use crate::retry::{ParaphraseRetry, RetryPolicy};
use crate::segmenter::split_sentences;
use crate::selector::select_within_budget;
use crate::tokenizer::TokenEstimator;
use crate::types::{OptimizationResult, OptimizationStage, PromptFitConfig};
use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fits prompts into a token budget
pub struct PromptOptimizer {
    config: PromptFitConfig,
    embedder: CachedEmbedder,
    paraphraser: Arc<dyn ParaphraseProvider>,
    estimator: Arc<dyn TokenEstimator>,
    cancel: Option<CancellationToken>,
}

impl PromptOptimizer {
    /// Create an optimizer with the HTTP providers named in `config`
    pub fn new(config: PromptFitConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let paraphraser = create_paraphraser(&config.paraphrase)?;
        Self::with_providers(config, embedder, paraphraser)
    }

    /// Create an optimizer around caller-supplied providers.
    ///
    /// Provider settings in `config` are ignored; budget, retry policy,
    /// `top_k` and estimator still apply.
    pub fn with_providers(
        config: PromptFitConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        paraphraser: Arc<dyn ParaphraseProvider>,
    ) -> Result<Self> {
        let estimator = config.estimator.build()?;
        Ok(Self {
            config,
            embedder: CachedEmbedder::new(embedder, Arc::new(EmbeddingCache::new())),
            paraphraser,
            estimator,
            cancel: None,
        })
    }

    /// Share an embedding cache with other optimizers
    pub fn with_embedding_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.embedder = CachedEmbedder::new(self.embedder.inner().clone(), cache);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = Some(top_k);
        self
    }

    /// Cut the paraphrase loop short when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PromptFitConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        self.embedder.cache()
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Fit `prompt` into `max_tokens`, favouring content relevant to `query`.
    ///
    /// Only embedding failures are returned as errors; paraphrase failures
    /// fall back to the best text produced so far.
    pub async fn optimize(&self, prompt: &str, query: &str, max_tokens: usize) -> Result<String> {
        Ok(self.optimize_detailed(prompt, query, max_tokens).await?.text)
    }

    /// [`optimize`](Self::optimize) with the configured default budget
    pub async fn optimize_with_default_budget(&self, prompt: &str, query: &str) -> Result<String> {
        self.optimize(prompt, query, self.config.default_max_tokens)
            .await
    }

    /// Run the pipeline and report which stage produced the output
    pub async fn optimize_detailed(
        &self,
        prompt: &str,
        query: &str,
        max_tokens: usize,
    ) -> Result<OptimizationResult> {
        let segments = split_sentences(prompt);
        let original_tokens = self.estimator.estimate_total(&segments);
        info!(
            "Prompt split into {} segment(s), ~{} tokens (budget {})",
            segments.len(),
            original_tokens,
            max_tokens
        );

        if original_tokens <= max_tokens {
            debug!("Prompt already within budget, returning unchanged");
            return Ok(OptimizationResult {
                text: prompt.to_string(),
                budget: max_tokens,
                original_tokens,
                final_tokens: original_tokens,
                segment_count: segments.len(),
                selected_segments: segments.len(),
                stage: OptimizationStage::Passthrough,
            });
        }

        let ranked = rank_segments(&segments, query, &self.embedder, self.config.top_k).await?;
        let selection = select_within_budget(&ranked, max_tokens, self.estimator.as_ref());
        let pruned = selection.text();
        let pruned_tokens = self.estimator.estimate(&pruned);
        info!(
            "Kept {} of {} segment(s), ~{} tokens",
            selection.len(),
            segments.len(),
            pruned_tokens
        );

        if pruned_tokens <= max_tokens {
            return Ok(OptimizationResult {
                text: pruned,
                budget: max_tokens,
                original_tokens,
                final_tokens: pruned_tokens,
                segment_count: segments.len(),
                selected_segments: selection.len(),
                stage: OptimizationStage::Pruned,
            });
        }

        info!("Pruned prompt still over budget, paraphrasing");
        let outcome = self.paraphrase_retry().run(&pruned, max_tokens).await;

        Ok(OptimizationResult {
            text: outcome.text,
            budget: max_tokens,
            original_tokens,
            final_tokens: outcome.tokens,
            segment_count: segments.len(),
            selected_segments: selection.len(),
            stage: OptimizationStage::Paraphrased {
                status: outcome.status,
                attempts: outcome.attempts,
            },
        })
    }

    fn paraphrase_retry(&self) -> ParaphraseRetry {
        let retry = ParaphraseRetry::new(
            self.paraphraser.clone(),
            self.estimator.clone(),
            self.config.retry,
        );
        match &self.cancel {
            Some(token) => retry.with_cancellation(token.clone()),
            None => retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{EmbeddingVector, RetryStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scores a text by how many of its words appear in "alpha beta"
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    let hits = text
                        .to_lowercase()
                        .split_whitespace()
                        .filter(|w| w.starts_with("alpha") || w.starts_with("beta"))
                        .count() as f32;
                    vec![hits + 0.01, 1.0]
                })
                .collect())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            Err(Error::ProviderError("503 Service Unavailable".to_string()))
        }
    }

    /// Keeps the first word of its input
    struct FirstWordParaphraser {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ParaphraseProvider for FirstWordParaphraser {
        async fn rewrite(&self, text: &str, _instructions: &str, _hint: usize) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.split_whitespace().next().unwrap_or_default().to_string())
        }
    }

    /// One token per character, so joining segments costs extra tokens
    struct CharEstimator;

    impl TokenEstimator for CharEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    fn optimizer() -> (PromptOptimizer, Arc<KeywordEmbedder>, Arc<FirstWordParaphraser>) {
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });
        let paraphraser = Arc::new(FirstWordParaphraser {
            calls: AtomicUsize::new(0),
        });
        let optimizer = PromptOptimizer::with_providers(
            PromptFitConfig::default(),
            embedder.clone(),
            paraphraser.clone(),
        )
        .unwrap()
        .with_retry_policy(RetryPolicy::new(5, Duration::ZERO));
        (optimizer, embedder, paraphraser)
    }

    #[tokio::test]
    async fn test_passthrough_returns_exact_prompt() {
        let (optimizer, embedder, _) = optimizer();
        let prompt = "  Keep   this.\n\nExactly as written!  ";

        let result = optimizer.optimize_detailed(prompt, "anything", 100).await.unwrap();
        assert_eq!(result.text, prompt);
        assert_eq!(result.stage, OptimizationStage::Passthrough);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pruning_keeps_relevant_segments() {
        let (optimizer, _, paraphraser) = optimizer();
        let prompt = "Nothing here matters. Alpha beta matter most. Filler words go on and on. Beta counts too.";

        let result = optimizer.optimize_detailed(prompt, "alpha beta", 8).await.unwrap();
        assert_eq!(result.stage, OptimizationStage::Pruned);
        assert!(result.within_budget());
        assert!(result.text.starts_with("Alpha beta matter most."));
        assert_eq!(paraphraser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_paraphrase_when_join_exceeds_budget() {
        let (optimizer, _, paraphraser) = optimizer();
        let optimizer = optimizer.with_estimator(Arc::new(CharEstimator));
        // "aa." and "bb." fit 6 tokens on their own but "aa. bb." costs 7
        let result = optimizer.optimize_detailed("aa. bb. cc.", "alpha", 6).await.unwrap();

        assert_eq!(
            result.stage,
            OptimizationStage::Paraphrased {
                status: RetryStatus::Satisfied,
                attempts: 1
            }
        );
        assert_eq!(result.text, "aa.");
        assert_eq!(paraphraser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embedding_error_propagates() {
        let paraphraser = Arc::new(FirstWordParaphraser {
            calls: AtomicUsize::new(0),
        });
        let optimizer = PromptOptimizer::with_providers(
            PromptFitConfig::default(),
            Arc::new(DownEmbedder),
            paraphraser,
        )
        .unwrap();

        let err = optimizer
            .optimize("One sentence. Another sentence here.", "q", 2)
            .await
            .unwrap_err();
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_default_budget_and_cache_reuse() {
        let (mut optimizer, embedder, _) = optimizer();
        optimizer.config.default_max_tokens = 4;
        let prompt = "Alpha first. Second thing. Third thing.";

        let first = optimizer.optimize_with_default_budget(prompt, "alpha").await.unwrap();
        let second = optimizer.optimize_with_default_budget(prompt, "alpha").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "Alpha first.");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(optimizer.cache().len(), 4);
    }

    #[test]
    fn test_new_requires_api_keys() {
        let err = PromptOptimizer::new(PromptFitConfig::default()).err().unwrap();
        assert!(err.is_config_error());
    }
}
