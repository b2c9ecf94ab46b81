use serde::{Deserialize, Serialize};

/// One-to-one agreement between reference events and detections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub tolerance: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub sensitivity: f64,
    pub precision: f64,
}

/// Pair each reference index with at most one detection within `tolerance`
/// samples, scanning both sequences in ascending order.
pub fn match_events(reference: &[usize], detected: &[usize], tolerance: usize) -> MatchSummary {
    let mut reference = reference.to_vec();
    let mut detected = detected.to_vec();
    reference.sort_unstable();
    detected.sort_unstable();

    let mut matches = 0;
    let mut idx = 0;
    for &ann in &reference {
        while idx < detected.len() && detected[idx].saturating_add(tolerance) < ann {
            idx += 1;
        }
        if idx < detected.len() && detected[idx].abs_diff(ann) <= tolerance {
            matches += 1;
            idx += 1;
        }
    }
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    MatchSummary {
        tolerance,
        true_positives: matches,
        false_positives: detected.len() - matches,
        false_negatives: reference.len() - matches,
        sensitivity: ratio(matches, reference.len()),
        precision: ratio(matches, detected.len()),
    }
}
