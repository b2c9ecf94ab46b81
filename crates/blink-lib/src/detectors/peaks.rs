/// Collapse every run of samples above `threshold` into the index of its
/// largest sample (first occurrence on ties).
///
/// After a run ending at `end` (exclusive) the scan resumes at
/// `end + refractory`, so runs inside the refractory window of a claimed peak
/// are never reported. Indices are local to `segment` and ascending.
pub fn find_peaks(segment: &[f64], threshold: f64, refractory: usize) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut cursor = 0;
    while cursor < segment.len() {
        let above = segment[cursor] > threshold;
        if !above {
            cursor += 1;
            continue;
        }
        let mut best = cursor;
        let mut end = cursor + 1;
        while end < segment.len() && segment[end] > threshold {
            if segment[end] > segment[best] {
                best = end;
            }
            end += 1;
        }
        peaks.push(best);
        cursor = end.saturating_add(refractory);
    }
    peaks
}
