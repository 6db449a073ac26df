//! Image query normalization.
//!
//! Activity names coming from generated itineraries are noisy ("Visit the
//! stunning Louvre Museum!"). Normalizing them improves both search
//! relevance and the cache hit rate, since near-identical names collapse
//! onto one key.

/// Promotional words that carry no search signal.
const FILLER_WORDS: &[&str] = &[
    "amazing",
    "awesome",
    "beautiful",
    "best",
    "breathtaking",
    "charming",
    "discover",
    "enjoy",
    "experience",
    "explore",
    "famous",
    "fantastic",
    "gorgeous",
    "iconic",
    "incredible",
    "magnificent",
    "must",
    "picturesque",
    "popular",
    "spectacular",
    "stunning",
    "unforgettable",
    "visit",
    "wonderful",
];

/// Words skipped when picking the most significant word.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "the", "to", "with",
];

/// Lower-case, strip punctuation and filler words, collapse whitespace.
///
/// If only filler words remain, they are kept (still without punctuation)
/// so a query is never blanked out.
pub fn normalize_query(term: &str) -> String {
    let lowered = term.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !FILLER_WORDS.contains(w))
        .collect();

    if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    }
}

/// First word of a normalized query that is not a stop word.
///
/// Returns `None` when that word is the whole query, since retrying with
/// it would repeat the same search.
pub fn first_significant_word(normalized: &str) -> Option<&str> {
    let word = normalized
        .split_whitespace()
        .find(|w| !STOP_WORDS.contains(w) && w.chars().count() > 2)?;
    if word == normalized.trim() {
        None
    } else {
        Some(word)
    }
}
