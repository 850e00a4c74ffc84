//! Concept extraction for graph linking

use std::collections::HashMap;

/// At most this many concepts are kept per text
pub const MAX_CONCEPTS: usize = 10;

const MIN_WORD_LENGTH: usize = 3;
/// Words longer than this are concepts even when they appear once
const SALIENT_WORD_LENGTH: usize = 6;

const STOP_WORDS: &[&str] = &[
    "the", "and", "are", "was", "for", "with", "this", "that", "have", "has", "had", "will",
    "can", "could", "should", "would",
];

/// Lowercase ASCII-alphabetic words of at least three letters.
///
/// A word is a maximal run of letters, digits and underscores; runs containing
/// anything other than ASCII letters are dropped whole, so `abc123` and `café`
/// yield nothing while `robot's` yields `robot`.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|run| run.len() >= MIN_WORD_LENGTH && run.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_ascii_lowercase)
}

/// Representative keywords of `text`, in order of first appearance.
///
/// A non-stopword qualifies if it occurs more than once or is longer than six
/// letters.
pub fn extract(text: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut frequency: HashMap<String, usize> = HashMap::new();

    for word in words(text).filter(|w| !STOP_WORDS.contains(&w.as_str())) {
        let count = frequency.entry(word.clone()).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|word| frequency.get(word).copied().unwrap_or(0) > 1 || word.len() > SALIENT_WORD_LENGTH)
        .take(MAX_CONCEPTS)
        .collect()
}
