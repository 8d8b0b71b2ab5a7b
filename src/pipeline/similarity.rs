//! Fingerprint comparison.
//!
//! Distance is counted per hex character, not per bit: two hashes whose
//! nibbles differ in one bit or in four bits contribute the same distance
//! of 1. Match thresholds across the system are expressed in this unit.

use crate::output::VisualFingerprint;

/// Default per-kind distance still counted as a match.
pub const DEFAULT_THRESHOLD: usize = 5;

/// Hash kinds that must match for two fingerprints to be similar.
pub const REQUIRED_MATCHES: usize = 2;

/// Number of mismatching character positions between two hashes.
///
/// `None` means incomparable (either side absent, or lengths differ) and
/// behaves as an infinite distance.
pub fn distance(a: Option<&str>, b: Option<&str>) -> Option<usize> {
    let (a, b) = (a?, b?);
    if a.chars().count() != b.chars().count() {
        return None;
    }
    Some(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count())
}

/// Per-kind distances between two fingerprint sets, in `phash, dhash, ahash`
/// order.
pub fn distances(a: &VisualFingerprint, b: &VisualFingerprint) -> [(&'static str, Option<usize>); 3] {
    let (ka, kb) = (a.kinds(), b.kinds());
    [
        (ka[0].0, distance(Some(ka[0].1), Some(kb[0].1))),
        (ka[1].0, distance(Some(ka[1].1), Some(kb[1].1))),
        (ka[2].0, distance(Some(ka[2].1), Some(kb[2].1))),
    ]
}

/// Majority vote: at least two of the three hash kinds within `threshold`.
///
/// Absent fingerprints are never similar to anything.
pub fn are_similar(
    a: Option<&VisualFingerprint>,
    b: Option<&VisualFingerprint>,
    threshold: usize,
) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    let matches = distances(a, b)
        .iter()
        .filter(|(_, d)| matches!(d, Some(d) if *d <= threshold))
        .count();
    matches >= REQUIRED_MATCHES
}
