//! Flow tuning knobs.

use serde::{Deserialize, Serialize};

/// Limits that shape the answer prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Largest prompt, in model tokens, sent for the final answer.
    pub max_prompt_tokens: usize,
    /// Stop looking for background once the prompt is this close to the maximum.
    pub headroom: usize,
    /// Pages requested per search term.
    pub results_per_term: usize,
    /// Shortest accepted search term, in characters.
    pub min_term_chars: usize,
    /// Longest accepted search term, in characters.
    pub max_term_chars: usize,
    /// Word limit requested when summarizing a page that does not fit.
    pub summary_words: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 3072,
            headroom: 100,
            results_per_term: 3,
            min_term_chars: 2,
            max_term_chars: 64,
            summary_words: 500,
        }
    }
}

impl FlowConfig {
    /// Whether a prompt of `tokens` leaves no useful room for more background.
    pub fn budget_exhausted(&self, tokens: usize) -> bool {
        tokens + self.headroom >= self.max_prompt_tokens
    }

    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.max_prompt_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let config = FlowConfig::default();
        assert!(!config.budget_exhausted(2971));
        assert!(config.budget_exhausted(2972));
        assert!(config.fits(3072));
        assert!(!config.fits(3073));
    }
}
