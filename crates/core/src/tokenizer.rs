use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_TERM_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s_-]+").expect("term filter pattern is valid"));

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "is", "it", "in", "on", "at", "to", "of", "for", "and", "or", "not",
        "with", "this", "that", "was", "are", "be", "has", "had", "have", "do", "does", "did",
        "but", "if", "then", "so", "as", "by", "from", "we", "you", "he", "she", "they", "i",
        "my", "your", "our", "its", "no", "yes", "can", "will", "just", "how", "what", "when",
        "where", "who", "which", "why", "all", "each", "every", "about", "up", "out", "into",
        "over", "after", "been", "being", "would", "could", "should", "may", "might",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(term)
}

/// Lowercases `text` and splits it into search terms. Order and duplicates are
/// kept; single characters and stopwords are dropped. Hyphens and underscores
/// stay inside terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    NON_TERM_CHARS
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|token| token.chars().count() > 1 && !is_stopword(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_stopwords_are_removed() {
        assert_eq!(tokenize("The Quick DB-Auth!"), vec!["quick", "db-auth"]);
    }

    #[test]
    fn duplicates_and_order_are_preserved() {
        assert_eq!(
            tokenize("cache miss, then cache_key miss"),
            vec!["cache", "miss", "cache_key", "miss"]
        );
    }

    #[test]
    fn short_tokens_are_dropped() {
        assert_eq!(tokenize("x y z k8s"), vec!["k8s"]);
    }

    #[test]
    fn non_ascii_letters_split_terms() {
        assert_eq!(tokenize("café-login"), vec!["caf", "-login"]);
    }

    #[test]
    fn query_of_only_noise_is_empty() {
        assert!(tokenize("!!!").is_empty());
        assert!(tokenize("what is it?").is_empty());
    }
}
