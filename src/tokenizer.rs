//! Token estimation
//!
//! The pipeline only needs a fast, deterministic approximation of how many
//! tokens a piece of text costs. [`ApproximateTokenizer`] is the built-in
//! heuristic; [`Tokenizer`] swaps in a real BPE vocabulary when closer
//! agreement with a model's tokenizer is wanted.

use crate::error::{Error, Result};
use crate::types::Segment;
use lazy_static::lazy_static;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

/// Approximates the token cost of text.
///
/// Implementations must be pure and must never estimate a concatenation
/// below either of its parts.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count of a single text
    fn estimate(&self, text: &str) -> usize;

    /// Per-segment estimates, in segment order
    fn estimate_each(&self, segments: &[Segment]) -> Vec<usize> {
        segments.iter().map(|s| self.estimate(s.text())).collect()
    }

    /// Sum of [`TokenEstimator::estimate_each`]
    fn estimate_total(&self, segments: &[Segment]) -> usize {
        self.estimate_each(segments).into_iter().sum()
    }
}

/// Word-based heuristic estimator.
///
/// Every whitespace-separated word costs `ceil(chars / chars_per_token)`
/// tokens, and never less than one.
#[derive(Debug, Clone)]
pub struct ApproximateTokenizer {
    chars_per_token: usize,
}

impl ApproximateTokenizer {
    pub fn new() -> Self {
        Self { chars_per_token: 4 }
    }

    /// Create with a custom characters-per-token ratio (clamped to at least 1)
    pub fn with_chars_per_token(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for ApproximateTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator for ApproximateTokenizer {
    fn estimate(&self, text: &str) -> usize {
        text.split_whitespace()
            .map(|word| {
                let chars = word.chars().count();
                ((chars + self.chars_per_token - 1) / self.chars_per_token).max(1)
            })
            .sum()
    }
}

/// Supported BPE vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerModel {
    /// GPT-4, GPT-3.5-turbo, most embedding models
    Cl100kBase,
    /// GPT-4o family
    O200kBase,
}

impl TokenizerModel {
    /// Pick the vocabulary for a model name
    pub fn from_model_name(model: &str) -> Self {
        if model.to_lowercase().contains("gpt-4o") {
            Self::O200kBase
        } else {
            Self::Cl100kBase
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
        }
    }
}

lazy_static! {
    static ref CL100K_BASE: Option<Arc<CoreBPE>> = cl100k_base().ok().map(Arc::new);
    static ref O200K_BASE: Option<Arc<CoreBPE>> = o200k_base().ok().map(Arc::new);
}

/// BPE-backed estimator using a bundled tiktoken vocabulary
#[derive(Clone)]
pub struct Tokenizer {
    model: TokenizerModel,
    bpe: Arc<CoreBPE>,
}

impl Tokenizer {
    pub fn new(model: TokenizerModel) -> Result<Self> {
        let bpe = match model {
            TokenizerModel::Cl100kBase => CL100K_BASE.clone(),
            TokenizerModel::O200kBase => O200K_BASE.clone(),
        }
        .ok_or_else(|| {
            Error::ConfigError(format!("Failed to load {} vocabulary", model.name()))
        })?;

        Ok(Self { model, bpe })
    }

    pub fn from_model_name(model_name: &str) -> Result<Self> {
        Self::new(TokenizerModel::from_model_name(model_name))
    }

    pub fn model(&self) -> TokenizerModel {
        self.model
    }
}

impl TokenEstimator for Tokenizer {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Which estimator a configuration asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorKind {
    #[default]
    Approximate,
    Bpe(TokenizerModel),
}

impl EstimatorKind {
    pub fn build(&self) -> Result<Arc<dyn TokenEstimator>> {
        Ok(match self {
            EstimatorKind::Approximate => Arc::new(ApproximateTokenizer::new()),
            EstimatorKind::Bpe(model) => Arc::new(Tokenizer::new(*model)?),
        })
    }
}
