//! Length-based token estimation.
//!
//! The estimate is a proxy for batch sizing, not a tokenizer: it only needs to
//! be proportional to text length, zero for empty text and monotonic.

/// Characters counted as one token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate generation units for `text` as `ceil(chars / CHARS_PER_TOKEN)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}
