//! Budget-constrained segment selection
//!
//! Walks ranked segments from most to least relevant and keeps each one
//! while the running total stays within budget. Scanning stops at the first
//! segment that does not fit; later, smaller segments are not considered.

use crate::tokenizer::TokenEstimator;
use crate::types::{RelevanceScore, Segment};
use log::debug;

/// Segments kept by [`select_within_budget`], in relevance order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub segments: Vec<Segment>,
    /// Sum of the per-segment estimates
    pub total_tokens: usize,
}

impl Selection {
    /// Selected segments joined with single spaces
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Greedily select ranked segments within `budget` tokens.
///
/// The output keeps the ranked (descending relevance) order, not the
/// original segment order. If the top segment alone exceeds the budget the
/// selection is empty.
///
/// # Examples
///
/// ```
/// use promptfit::selector::select_within_budget;
/// use promptfit::tokenizer::ApproximateTokenizer;
/// use promptfit::types::Segment;
///
/// let ranked = vec![
///     (Segment::new(1, "most relevant"), 0.9),
///     (Segment::new(0, "too long to fit here"), 0.5),
///     (Segment::new(2, "small"), 0.1),
/// ];
/// let selection = select_within_budget(&ranked, 4, &ApproximateTokenizer::new());
/// assert_eq!(selection.text(), "most relevant");
/// ```
pub fn select_within_budget(
    ranked: &[(Segment, RelevanceScore)],
    budget: usize,
    estimator: &dyn TokenEstimator,
) -> Selection {
    let mut selection = Selection::default();

    for (segment, _) in ranked {
        let tokens = estimator.estimate(segment.text());
        let next_total = selection.total_tokens.saturating_add(tokens);
        if next_total > budget {
            debug!(
                "Segment {} ({} tokens) exceeds remaining budget {}, stopping",
                segment.index(),
                tokens,
                budget - selection.total_tokens
            );
            break;
        }
        selection.segments.push(segment.clone());
        selection.total_tokens = next_total;
    }

    selection
}
