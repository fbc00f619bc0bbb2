//! Relevance pruning without network access
//!
//! Uses a bag-of-words embedder and a truncating paraphraser so the whole
//! pipeline can be explored offline:
//!
//! ```text
//! RUST_LOG=debug cargo run --example relevance_demo
//! ```

use async_trait::async_trait;
use promptfit::{
    rank_segments, split_sentences, ApproximateTokenizer, EmbeddingProvider, EmbeddingVector,
    ParaphraseProvider, PromptFitConfig, PromptOptimizer, Result, TokenEstimator,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const DIMENSIONS: usize = 64;

/// Hashes lowercase words into a fixed number of buckets
struct BagOfWordsEmbedder;

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMENSIONS];
                for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 3) {
                    let mut hasher = DefaultHasher::new();
                    word.to_lowercase().hash(&mut hasher);
                    vector[hasher.finish() as usize % DIMENSIONS] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Keeps the first `max_tokens_hint` words
struct TruncatingParaphraser;

#[async_trait]
impl ParaphraseProvider for TruncatingParaphraser {
    async fn rewrite(
        &self,
        text: &str,
        _instructions: &str,
        max_tokens_hint: usize,
    ) -> Result<String> {
        Ok(text
            .split_whitespace()
            .take(max_tokens_hint.max(1))
            .collect::<Vec<_>>()
            .join(" "))
    }
}

const PROMPT: &str = "The deployment pipeline runs on every merge to main. \
Database migrations must be reviewed by two engineers. \
The office plants are watered on Tuesdays. \
Rollbacks use the previous container image and skip migrations. \
Lunch orders close at eleven. \
Failed deployments page the on-call engineer immediately.";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let query = "What happens when a deployment fails and needs a rollback?";
    let estimator = ApproximateTokenizer::new();
    let segments = split_sentences(PROMPT);

    println!("Query: {}\n", query);
    println!("Ranking:");
    for (segment, score) in rank_segments(&segments, query, &BagOfWordsEmbedder, None).await? {
        println!(
            "  {:>6.3}  [{:>2} tokens]  {}",
            score,
            estimator.estimate(segment.text()),
            segment.text()
        );
    }

    let optimizer = PromptOptimizer::with_providers(
        PromptFitConfig::default(),
        Arc::new(BagOfWordsEmbedder),
        Arc::new(TruncatingParaphraser),
    )?;

    println!();
    for budget in [200, 40, 20, 0] {
        let result = optimizer.optimize_detailed(PROMPT, query, budget).await?;
        println!(
            "budget {:>3}: {:>2} tokens, {:?}\n  {}\n",
            budget, result.final_tokens, result.stage, result.text
        );
    }

    Ok(())
}
