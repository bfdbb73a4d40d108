use serde::Serialize;

/// One slice of a segmented bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub dimension_id: String,
    pub raw_value: f64,
    pub proportion: f64,
}

/// Normalize per-dimension subtotals into proportions.
///
/// Returns an empty breakdown when the total is zero. Zero-valued entries
/// are dropped; negative or non-finite values count as zero. The result is
/// sorted by `raw_value` descending, and the sort is stable so ties keep the
/// input (catalog) order.
///
/// Proportions sum to 1.0 up to floating-point rounding. Rounding them
/// further, e.g. to whole percentage points, can break that.
pub fn compose<S: AsRef<str>>(subtotals: &[(S, f64)]) -> Vec<Segment> {
    let cleaned: Vec<(&str, f64)> = subtotals
        .iter()
        .map(|(id, raw)| (id.as_ref(), sanitize(*raw)))
        .collect();

    let total: f64 = cleaned.iter().map(|(_, raw)| raw).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut segments: Vec<Segment> = cleaned
        .into_iter()
        .filter(|(_, raw)| *raw > 0.0)
        .map(|(id, raw)| Segment {
            dimension_id: id.to_string(),
            raw_value: raw,
            proportion: raw / total,
        })
        .collect();
    segments.sort_by(|a, b| b.raw_value.total_cmp(&a.raw_value));
    segments
}

fn sanitize(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}
