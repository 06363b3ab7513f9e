use std::collections::HashMap;

use beneficiary_core::normalize_name;

use super::KnowledgeEntry;

/// Bonus added when the product name matches too
const PRODUCT_BONUS: f64 = 0.1;

/// Weakest match a store hands back from a similarity search
pub const MIN_CANDIDATE_SIMILARITY: f64 = 0.5;

fn compact(name: &str) -> String {
    normalize_name(name).replace(' ', "")
}

/// Dice coefficient over character bigrams of the normalized names
pub fn bigram_similarity(a: &str, b: &str) -> f64 {
    let a = compact(a);
    let b = compact(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    let a_total: usize = a_bigrams.values().sum();
    let b_total: usize = b_bigrams.values().sum();
    if a_total == 0 || b_total == 0 {
        return 0.0;
    }

    let shared: usize = a_bigrams
        .iter()
        .map(|(gram, count)| (*count).min(b_bigrams.get(gram).copied().unwrap_or(0)))
        .sum();
    2.0 * shared as f64 / (a_total + b_total) as f64
}

fn bigrams(text: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut counts = HashMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

/// Range of compact brand lengths that can reach [`MIN_CANDIDATE_SIMILARITY`]
///
/// Dice over `n` and `m` bigrams is at most `2 * min(n, m) / (n + m)`, so
/// names far longer or shorter than the query are skipped without scoring.
/// Lengths count characters of the normalized name with spaces removed.
pub fn candidate_length_window(brand: &str) -> Option<(usize, usize)> {
    let len = compact(brand).chars().count();
    if len == 0 {
        return None;
    }
    let needed = MIN_CANDIDATE_SIMILARITY - PRODUCT_BONUS;
    let bigrams = (len - 1) as f64;
    let min_bigrams = (bigrams * needed / (2.0 - needed) - 1e-9).ceil().max(0.0) as usize;
    let max_bigrams = (bigrams * (2.0 - needed) / needed + 1e-9).floor() as usize;
    Some((min_bigrams + 1, max_bigrams + 1))
}

/// Similarity of a stored entry to a brand (and optional product) query
pub fn match_score(brand: &str, product_name: Option<&str>, entry: &KnowledgeEntry) -> f64 {
    let mut score = bigram_similarity(brand, &entry.brand);
    let product = product_name.map(normalize_name).filter(|p| !p.is_empty());
    let entry_product = entry
        .product_name
        .as_deref()
        .map(normalize_name)
        .filter(|p| !p.is_empty());
    if let (Some(query), Some(stored)) = (product, entry_product) {
        if query == stored {
            score += PRODUCT_BONUS;
        }
    }
    score.min(1.0)
}
