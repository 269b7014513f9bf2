//! Region assignment: each box goes to the declared region holding its
//! center.

use indexmap::IndexMap;

use super::{MappedField, MappedResult, MappingPolicy, OverlappingMatch, Region};
use crate::{
    detection::{DetectedBox, PageDimensions},
    prelude::*,
};

/// Which box currently holds each region, plus overlap diagnostics.
///
/// Built by folding over the input boxes in order.
#[derive(Debug)]
struct Claims {
    /// Winning box index for each region, by region position.
    winners: Vec<Option<usize>>,

    /// Boxes that matched more than one region.
    overlapping_matches: Vec<OverlappingMatch>,
}

/// Assign boxes to regions.
///
/// A box claims the first region (in declaration order) that contains its
/// normalized center. When several boxes claim one region, the most
/// confident box wins, and ties go to the earliest box. Everything else is
/// unmapped.
pub(super) fn map_positional(
    boxes: Vec<DetectedBox>,
    policy: &MappingPolicy,
    regions: &IndexMap<String, Region>,
    page_dims: PageDimensions,
) -> MappedResult {
    // Logged once when the configuration is validated.
    let malformed_regions = policy
        .malformed_regions()
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();

    let width = f64::from(page_dims.width);
    let height = f64::from(page_dims.height);

    let initial = Claims {
        winners: vec![None; regions.len()],
        overlapping_matches: vec![],
    };
    let claims = boxes.iter().enumerate().fold(initial, |mut claims, (idx, b)| {
        let center = b.center();
        let (x, y) = (center.x() / width, center.y() / height);
        let matched = regions
            .values()
            .enumerate()
            .filter(|(_, region)| region.contains(x, y))
            .map(|(region_idx, _)| region_idx)
            .collect::<Vec<_>>();

        let Some((&claimed, others)) = matched.split_first() else {
            trace!(box_index = idx, x, y, "Box is outside every region");
            return claims;
        };
        if !others.is_empty() {
            let name_of = |i: usize| regions.get_index(i).map(|(n, _)| n.clone());
            let overlap = OverlappingMatch {
                box_index: idx,
                claimed_by: name_of(claimed).unwrap_or_default(),
                also_matched: others.iter().filter_map(|&i| name_of(i)).collect(),
            };
            debug!(?overlap, "Box matched overlapping regions");
            claims.overlapping_matches.push(overlap);
        }

        let replace = match claims.winners[claimed] {
            None => true,
            Some(current) => b.confidence > boxes[current].confidence,
        };
        if replace {
            claims.winners[claimed] = Some(idx);
        }
        claims
    });

    // Hand each box to its region, or to the unmapped list.
    let total_boxes_seen = boxes.len();
    let mut region_of_box = vec![None; total_boxes_seen];
    for (region_idx, winner) in claims.winners.iter().enumerate() {
        if let Some(box_idx) = winner {
            region_of_box[*box_idx] = Some(region_idx);
        }
    }
    let mut assigned = vec![None; regions.len()];
    let mut unmapped_boxes = vec![];
    for (b, region) in boxes.into_iter().zip(region_of_box) {
        match region {
            Some(region_idx) => assigned[region_idx] = Some(b),
            None => unmapped_boxes.push(b),
        }
    }
    let fields = regions
        .keys()
        .zip(assigned)
        .filter_map(|(name, b)| Some((name.clone(), MappedField::from(b?))))
        .collect::<IndexMap<_, _>>();

    let mut result = MappedResult::new(policy, total_boxes_seen, fields, unmapped_boxes);
    result.metadata.overlapping_matches = claims.overlapping_matches;
    result.metadata.malformed_regions = malformed_regions;
    result
}
