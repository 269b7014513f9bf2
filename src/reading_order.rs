//! Confidence filtering and reading-order sorting for the boxes on one page.

use crate::{detection::DetectedBox, prelude::*};

/// Default vertical distance, in pixels, within which box centers count as
/// being on the same line.
pub const DEFAULT_LINE_TOLERANCE: f64 = 20.0;

/// Keep only boxes with `confidence >= min_confidence`, in their original
/// order.
pub fn filter_by_confidence(
    boxes: Vec<DetectedBox>,
    min_confidence: f64,
) -> Vec<DetectedBox> {
    let before = boxes.len();
    let kept = boxes
        .into_iter()
        .filter(|b| b.confidence >= min_confidence)
        .collect::<Vec<_>>();
    debug!(
        dropped = before - kept.len(),
        kept = kept.len(),
        min_confidence,
        "Filtered low-confidence boxes"
    );
    kept
}

/// Sort boxes into reading order: lines from top to bottom, then boxes from
/// left to right within each line.
///
/// Lines are found by bucketing each box's center y into bands of
/// `line_tolerance` pixels. Two boxes whose centers are only a pixel apart
/// can land in different bands if a band boundary falls between them, and
/// will then be read as separate lines.
///
/// The sort is stable, so boxes sharing both a band and a center x keep
/// their input order. Sorting an already sorted list is a no-op.
pub fn sort_reading_order(
    boxes: Vec<DetectedBox>,
    line_tolerance: f64,
) -> Vec<DetectedBox> {
    let mut keyed = boxes
        .into_iter()
        .map(|b| {
            let center = b.center();
            let line = (center.y() / line_tolerance).floor();
            (line, center.x(), b)
        })
        .collect::<Vec<_>>();

    // Bands are disjoint intervals, so ordering by band is the same as
    // ordering lines by their topmost member.
    keyed.sort_by(|(line_a, x_a, _), (line_b, x_b, _)| {
        line_a.total_cmp(line_b).then_with(|| x_a.total_cmp(x_b))
    });

    keyed.into_iter().map(|(_, _, b)| b).collect()
}
