//! services/api/src/adapters/tokens.rs
//!
//! Token counting via the tiktoken `cl100k_base` encoding, which matches the
//! models this content is typically pasted into. Implements the
//! `TokenEstimator` port from the `core` crate.

use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

use ctxt_core::ports::TokenEstimator;

pub struct TiktokenAdapter {
    bpe: Option<CoreBPE>,
}

impl Default for TiktokenAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TiktokenAdapter {
    /// Builds the encoder once. If the encoding cannot be initialized the
    /// adapter stays usable and falls back to a character-based estimate.
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable, falling back to length estimate");
                None
            }
        };
        Self { bpe }
    }
}

impl TokenEstimator for TiktokenAdapter {
    fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            // Rough average of four characters per token.
            None => (text.len() / 4).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_deterministic() {
        let adapter = TiktokenAdapter::new();
        let text = "Clean markdown conversion from webpage";
        assert_eq!(adapter.count(text), adapter.count(text));
        assert!(adapter.count(text) > 0);
    }

    #[test]
    fn fallback_estimates_from_length() {
        let adapter = TiktokenAdapter { bpe: None };
        assert_eq!(adapter.count(""), 1);
        assert_eq!(adapter.count(&"a".repeat(40)), 10);
    }
}
