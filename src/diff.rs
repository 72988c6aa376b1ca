use std::collections::HashSet;

use crate::types::Listing;

/// Returns the subset of `current` whose URL does not appear in `previous`,
/// preserving `current`'s relative order.
///
/// URL is deliberately the sole identity key. A marketplace that re-lists an
/// item under a fresh URL will make it show up as "new" again — an accepted
/// false positive. Using the looser title+price key here instead would
/// suppress genuine price-change re-listings, which is the worse failure for
/// a new-listing feed. That looser key exists only as the baseline duplicate
/// check (`baseline_key`), applied by the feed store at insert time.
pub fn new_listings(current: &[Listing], previous: &[Listing]) -> Vec<Listing> {
    let seen: HashSet<&str> = previous.iter().map(|l| l.url.as_str()).collect();
    current
        .iter()
        .filter(|l| !seen.contains(l.url.as_str()))
        .cloned()
        .collect()
}

/// Normalized (title, price) identity used for baseline duplicate suppression.
/// Distinct from the URL key above; the two predicates serve different
/// invariants and must not be merged.
pub fn baseline_key(title: &str, price_value: Option<f64>) -> (String, Option<i64>) {
    (
        title.trim().to_lowercase(),
        price_value.map(|p| p.round() as i64),
    )
}
