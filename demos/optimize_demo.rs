//! Fit a prompt into a token budget using Cohere
//!
//! Requires `COHERE_API_KEY`. Run with:
//!
//! ```text
//! RUST_LOG=info cargo run --example optimize_demo -- 40
//! ```
//!
//! The optional argument is the token budget (defaults to
//! `PROMPTFIT_MAX_TOKENS` or 4096).

use promptfit::{OptimizationStage, PromptFitConfig, PromptOptimizer};

const PROMPT: &str = "You are a customer support assistant for an online bookstore. \
Always greet the customer by name when it is available. \
Our headquarters moved to a new building with a rooftop garden last spring. \
Refunds are issued to the original payment method within five business days. \
Orders over fifty dollars ship for free within the continental United States. \
The staff cafeteria serves pancakes every Friday morning. \
If a customer asks about a refund, confirm the order number before anything else. \
Never share internal ticket identifiers with customers.";

const QUERY: &str = "How long does a refund take?";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = PromptFitConfig::from_env()?;
    let budget = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => config.default_max_tokens,
    };

    let optimizer = PromptOptimizer::new(config)?;
    let result = optimizer.optimize_detailed(PROMPT, QUERY, budget).await?;

    println!("Query: {}", QUERY);
    println!("Budget: {} tokens\n", budget);
    println!("Original ({} tokens):\n{}\n", result.original_tokens, PROMPT);
    println!("Optimized ({} tokens):\n{}\n", result.final_tokens, result.text);

    match result.stage {
        OptimizationStage::Passthrough => println!("Prompt already fit; returned unchanged."),
        OptimizationStage::Pruned => println!(
            "Kept {} of {} sentences.",
            result.selected_segments, result.segment_count
        ),
        OptimizationStage::Paraphrased { status, attempts } => println!(
            "Kept {} of {} sentences, then paraphrased in {} attempt(s): {:?}",
            result.selected_segments, result.segment_count, attempts, status
        ),
    }
    println!("Compression ratio: {:.1}%", result.compression_ratio() * 100.0);

    let stats = optimizer.cache().stats();
    println!("Embedding cache: {} entries", stats.entries);

    Ok(())
}
