//! Paraphrase retry loop
//!
//! When pruning alone cannot meet the budget, the text is handed to a
//! [`ParaphraseProvider`] repeatedly. Each over-budget rewrite becomes the
//! next input and the instruction gets stricter; provider failures retry
//! the same input. Every failed or insufficient attempt is followed by an
//! exponential backoff. The loop always ends with *some* text: the first
//! rewrite that fits, or the shortest text seen once retries run out.
//!
//! The transition logic lives in [`advance`], a pure function over
//! [`RetryState`], so it can be tested without a provider or a clock.

use crate::provider::ParaphraseProvider;
use crate::tokenizer::TokenEstimator;
use crate::types::{ParaphraseAttempt, RetryStatus};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Instruction sent with the first rewrite request
pub const BASE_INSTRUCTIONS: &str = "Preserve all key instructions and meaning.";

/// Retry and backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each later retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Upper bound on provider calls
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Rewrite instruction that escalates each over-budget round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction {
    level: u32,
}

impl Instruction {
    pub fn initial() -> Self {
        Self::default()
    }

    /// The next, stricter instruction
    pub fn tightened(self) -> Self {
        Self {
            level: self.level.saturating_add(1),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Instruction text for a given budget
    pub fn render(&self, budget: usize) -> String {
        let mut text = String::from(BASE_INSTRUCTIONS);
        if self.level >= 1 {
            text.push_str(&format!(
                " The previous rewrite was still too long. Compress it further to at most {} tokens.",
                budget
            ));
        }
        if self.level >= 2 {
            text.push_str(" Drop examples, asides and repetition; keep only what is essential.");
        }
        if self.level >= 3 {
            text.push_str(&format!(
                " Be extremely terse; telegraphic phrasing is fine. \
                 This is compression round {} and {} tokens is a hard limit.",
                self.level + 1,
                budget
            ));
        }
        text
    }
}

/// Progress of the retry loop between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Provider calls made so far
    pub attempts: u32,
    /// Text to send on the next attempt
    pub input: String,
    pub instruction: Instruction,
    /// Lowest-token text seen, starting with the original input
    pub best_text: String,
    pub best_tokens: usize,
}

impl RetryState {
    pub fn new(text: String, tokens: usize) -> Self {
        Self {
            attempts: 0,
            input: text.clone(),
            instruction: Instruction::initial(),
            best_text: text,
            best_tokens: tokens,
        }
    }
}

/// Result of feeding one attempt into [`advance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Satisfied { text: String, tokens: usize },
    Retry(RetryState),
    Exhausted(RetryState),
}

/// Apply one attempt to the loop state.
///
/// A rewrite that fits ends the loop. An over-budget rewrite updates the
/// best text when it is shorter, becomes the next input, and tightens the
/// instruction. A failed attempt leaves input, instruction and best text
/// untouched. Either way the attempt counts against `policy.max_retries`.
pub fn advance(
    mut state: RetryState,
    attempt: ParaphraseAttempt,
    policy: &RetryPolicy,
) -> Transition {
    state.attempts = state.attempts.saturating_add(1);

    if let (Some(text), Some(tokens)) = (attempt.received, attempt.tokens) {
        if tokens < state.best_tokens {
            state.best_text = text.clone();
            state.best_tokens = tokens;
        }
        if attempt.satisfied {
            return Transition::Satisfied { text, tokens };
        }
        state.input = text;
        state.instruction = state.instruction.tightened();
    }

    if state.attempts > policy.max_retries {
        Transition::Exhausted(state)
    } else {
        Transition::Retry(state)
    }
}

/// What the retry loop returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParaphraseOutcome {
    pub text: String,
    pub tokens: usize,
    pub attempts: u32,
    pub status: RetryStatus,
}

impl ParaphraseOutcome {
    fn best_of(state: RetryState, status: RetryStatus) -> Self {
        Self {
            text: state.best_text,
            tokens: state.best_tokens,
            attempts: state.attempts,
            status,
        }
    }
}

/// Drives a paraphrase provider until the budget is met or retries run out
pub struct ParaphraseRetry {
    provider: Arc<dyn ParaphraseProvider>,
    estimator: Arc<dyn TokenEstimator>,
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl ParaphraseRetry {
    pub fn new(
        provider: Arc<dyn ParaphraseProvider>,
        estimator: Arc<dyn TokenEstimator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            estimator,
            policy,
            cancel: None,
        }
    }

    /// Stop early (returning the best text so far) once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Compress `text` toward `budget` tokens. Never fails.
    pub async fn run(&self, text: &str, budget: usize) -> ParaphraseOutcome {
        let tokens = self.estimator.estimate(text);
        let mut state = RetryState::new(text.to_string(), tokens);

        if tokens <= budget {
            return ParaphraseOutcome::best_of(state, RetryStatus::Satisfied);
        }

        loop {
            if self.is_cancelled() {
                warn!("Paraphrase cancelled after {} attempt(s)", state.attempts);
                return ParaphraseOutcome::best_of(state, RetryStatus::Cancelled);
            }

            let number = state.attempts + 1;
            let instructions = state.instruction.render(budget);
            let response = self
                .provider
                .rewrite(&state.input, &instructions, budget)
                .await;
            let attempt = match response {
                Ok(rewritten) => {
                    let tokens = self.estimator.estimate(&rewritten);
                    info!(
                        "Paraphrase attempt {}/{}: {} tokens (budget {})",
                        number,
                        self.policy.max_attempts(),
                        tokens,
                        budget
                    );
                    ParaphraseAttempt::rewritten(
                        number,
                        state.input.clone(),
                        rewritten,
                        tokens,
                        budget,
                    )
                }
                Err(e) => {
                    warn!("Paraphrase attempt {} failed: {}", number, e);
                    ParaphraseAttempt::failed(number, state.input.clone())
                }
            };

            state = match advance(state, attempt, &self.policy) {
                Transition::Satisfied { text, tokens } => {
                    return ParaphraseOutcome {
                        text,
                        tokens,
                        attempts: number,
                        status: RetryStatus::Satisfied,
                    };
                }
                Transition::Exhausted(state) => {
                    info!(
                        "Paraphrase retries exhausted; returning best attempt ({} tokens, budget {})",
                        state.best_tokens, budget
                    );
                    return ParaphraseOutcome::best_of(state, RetryStatus::Exhausted);
                }
                Transition::Retry(state) => state,
            };

            let delay = self.policy.delay_for(state.attempts);
            debug!("Backing off {:?} before attempt {}", delay, state.attempts + 1);
            if !self.backoff(delay).await {
                warn!("Paraphrase cancelled during backoff after {} attempt(s)", state.attempts);
                return ParaphraseOutcome::best_of(state, RetryStatus::Cancelled);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |token| token.is_cancelled())
    }

    /// Sleep for `delay`; false if cancelled first
    async fn backoff(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            },
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}
