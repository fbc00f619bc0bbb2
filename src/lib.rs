//! # promptfit
//!
//! Fit long prompts into an LLM token budget.
//!
//! Optimization runs in up to three stages:
//! 1. **Passthrough**: prompts already within budget are returned unchanged
//! 2. **Pruning**: sentences are ranked against a query by embedding
//!    similarity and the most relevant ones are kept
//! 3. **Paraphrasing**: if the pruned text is still too long, an LLM rewrites
//!    it under a bounded retry loop with exponential backoff
//!
//! ## Example
//!
//! ```rust,no_run
//! use promptfit::{PromptFitConfig, PromptOptimizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PromptFitConfig::from_env()?;
//!     let optimizer = PromptOptimizer::new(config)?;
//!
//!     let prompt = "You are a support agent. Answer billing questions politely. \
//!                   Our office has a blue carpet. Refunds take five business days.";
//!     let fitted = optimizer.optimize(prompt, "How long do refunds take?", 20).await?;
//!
//!     println!("{}", fitted);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cohere;
pub mod error;
pub mod openai;
pub mod optimizer;
pub mod provider;
pub mod relevance;
pub mod retry;
pub mod segmenter;
pub mod selector;
pub mod tokenizer;
pub mod types;

pub use cache::{CacheStats, EmbeddingCache};
pub use error::{Error, Result};
pub use optimizer::PromptOptimizer;
pub use provider::{
    create_embedder, create_paraphraser, CachedEmbedder, EmbeddingProvider, ParaphraseProvider,
};
pub use relevance::{cosine_similarity, rank_segments};
pub use retry::{
    advance, Instruction, ParaphraseOutcome, ParaphraseRetry, RetryPolicy, RetryState, Transition,
};
pub use segmenter::split_sentences;
pub use selector::{select_within_budget, Selection};
pub use tokenizer::{ApproximateTokenizer, EstimatorKind, TokenEstimator, Tokenizer, TokenizerModel};
pub use types::{
    EmbeddingVector, OptimizationResult, OptimizationStage, ParaphraseAttempt, PromptFitConfig,
    ProviderConfig, RelevanceScore, RetryStatus, Segment,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
