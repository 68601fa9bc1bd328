//! Character-based token approximation
//!
//! The whole pipeline uses the same four-characters-per-token estimate. It is
//! deliberately encoder-free; budgets are conservative enough to absorb the
//! error.

/// Estimate the token count of a text as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(9600)), 2400);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // four multi-byte characters are still one token
        assert_eq!(estimate_tokens("日本語だ"), 1);
    }
}
