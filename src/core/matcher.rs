//! Descriptor comparison. A candidate matches a stored descriptor when the
//! Euclidean distance between them is within the tolerance; missing input and
//! dimension mismatches never match.

/// L2 distance between two descriptors, or None when the dimensions differ.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

/// Distance-threshold decision. Equality with the tolerance counts as a match.
pub fn matches(known: Option<&[f64]>, candidate: Option<&[f64]>, tolerance: f64) -> bool {
    match (known, candidate) {
        (Some(a), Some(b)) => euclidean_distance(a, b).map_or(false, |d| d <= tolerance),
        _ => false,
    }
}
