use std::collections::HashSet;

/// English + Hindi-transliteration stopwords, dropped by [`preprocess`].
const STOPWORDS: &[&str] = &[
    // English
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", // Hindi
    "aur", "ka", "ki", "ke", "mein", "se", "par", "ko", "hai", "hain", "tha", "thi",
];

/// Split into lowercase alphanumeric tokens, keeping hyphens and periods as
/// part of a token's interior but stripping all other punctuation.
fn raw_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '.' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Preprocess text for classifier keyword matching: lowercase, strip
/// punctuation, drop stopwords and tokens of length <= 2, rejoin with
/// single spaces so multi-word keywords (e.g. "water level") still match
/// as substrings.
pub fn preprocess(text: &str) -> String {
    raw_tokens(text)
        .into_iter()
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize for lexical similarity (clusterer): lowercase, strip
/// punctuation, keep tokens of length > 2. No stopword removal — the
/// clusterer's Jaccard similarity is over raw content tokens.
pub fn tokenize_for_similarity(text: &str) -> HashSet<String> {
    raw_tokens(text)
        .into_iter()
        .filter(|w| w.len() > 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_drops_stopwords_and_short_tokens() {
        let out = preprocess("The flood is at the marina");
        assert_eq!(out, "flood marina");
    }

    #[test]
    fn preprocess_preserves_multi_word_phrases() {
        let out = preprocess("water level is rising fast");
        assert!(out.contains("water level"));
    }

    #[test]
    fn tokenize_keeps_stopwords_but_drops_short_tokens() {
        let tokens = tokenize_for_similarity("the dog is in the big red barn");
        assert!(tokens.contains("the"));
        assert!(tokens.contains("dog"));
        assert!(tokens.contains("big"));
        assert!(tokens.contains("red"));
        assert!(tokens.contains("barn"));
        assert!(!tokens.contains("is"));
        assert!(!tokens.contains("in"));
    }

    #[test]
    fn empty_text_yields_empty_output() {
        assert_eq!(preprocess(""), "");
        assert!(tokenize_for_similarity("").is_empty());
    }
}
