//! Reading-order assignment: the n-th box fills the n-th field.

use indexmap::IndexMap;

use super::{MappedField, MappedResult, MappingPolicy};
use crate::detection::DetectedBox;

/// Assign `boxes[i]` to `field_names[i]`.
///
/// Boxes beyond the last field name are left unmapped, in order. Field names
/// beyond the last box are simply absent from the result.
pub(super) fn map_sequential(
    boxes: Vec<DetectedBox>,
    policy: &MappingPolicy,
    field_names: &[String],
) -> MappedResult {
    let total_boxes_seen = boxes.len();
    let mut boxes = boxes.into_iter();

    // `zip` polls the field names first, so once they run out no further
    // box is consumed and the remainder stays in `boxes`.
    let fields = field_names
        .iter()
        .zip(boxes.by_ref())
        .map(|(name, b)| (name.clone(), MappedField::from(b)))
        .collect::<IndexMap<_, _>>();
    let unmapped_boxes = boxes.collect::<Vec<_>>();

    MappedResult::new(policy, total_boxes_seen, fields, unmapped_boxes)
}
