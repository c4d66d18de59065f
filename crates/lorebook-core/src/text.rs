//! Query/index tokenization.
//!
//! Tokenization is deliberately identical at index time and query time:
//! the BM25 statistics in the lexical snapshot are only comparable to a
//! query if both sides pass through this exact function. Non-ASCII
//! letters are treated as non-alphanumeric by contract.

/// Fixed English stop-word list excluded from lexical indexing.
pub const STOP_WORDS: [&str; 24] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokenizes text for lexical indexing and scoring.
///
/// Lowercases, replaces every character outside `[a-z0-9]` with a space,
/// splits on whitespace, and drops empty tokens and stop-words. Pure.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .filter(|t| !is_stop_word(t))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_splits() {
        assert_eq!(
            tokenize("Quick Brown FOX"),
            vec!["quick", "brown", "fox"]
        );
    }

    #[test]
    fn test_punctuation_becomes_separator() {
        assert_eq!(
            tokenize("hello,world! foo-bar"),
            vec!["hello", "world", "foo", "bar"]
        );
    }

    #[test]
    fn test_stop_words_dropped() {
        assert_eq!(
            tokenize("the quick brown fox jumps over the lazy dog"),
            vec!["quick", "brown", "fox", "jumps", "over", "lazy", "dog"]
        );
    }

    #[test]
    fn test_only_stop_words_yields_empty() {
        assert!(tokenize("the of and to in").is_empty());
    }

    #[test]
    fn test_digits_kept() {
        assert_eq!(tokenize("error 404 page"), vec!["error", "404", "page"]);
    }

    #[test]
    fn test_non_ascii_treated_as_separator() {
        assert_eq!(tokenize("caf\u{e9} na\u{ef}ve"), vec!["caf", "na", "ve"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t ").is_empty());
    }

    #[test]
    fn test_idempotence_after_filtering() {
        // Retokenizing the joined token stream must be a fixed point.
        let original = "The Quick, brown fox; of 2024!";
        let once = tokenize(original);
        let twice = tokenize(&once.join(" "));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_duplicates_preserved() {
        // BM25 counts each query occurrence separately, so the tokenizer
        // must not dedupe.
        assert_eq!(tokenize("fox fox fox"), vec!["fox", "fox", "fox"]);
    }
}
