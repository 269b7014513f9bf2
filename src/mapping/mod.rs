//! Assigning boxes to named fields.
//!
//! A [`MappingPolicy`] says how boxes become fields. There are exactly two
//! policies:
//!
//! - [`MappingPolicy::Sequential`] hands out boxes to field names in reading
//!   order. The caller is responsible for sorting the boxes first.
//! - [`MappingPolicy::Positional`] assigns each box to the declared page
//!   region containing its center.
//!
//! Either way, [`map_boxes`] accounts for every input box exactly once: it is
//! either the value of one field, or it appears in
//! [`MappedResult::unmapped_boxes`].

use indexmap::IndexMap;
use schemars::JsonSchema;

use crate::{
    detection::{DetectedBox, PageDimensions, Point},
    prelude::*,
};

pub mod positional;
pub mod sequential;

/// Which kind of [`MappingPolicy`] produced a result.
#[derive(Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    Sequential,
    Positional,
}

impl MappingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingMode::Sequential => "sequential",
            MappingMode::Positional => "positional",
        }
    }
}

/// A rectangle on the page, in fractions of page width and height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Region {
    /// Build a region from `[x_min, y_min, x_max, y_max]`.
    pub fn from_array([x_min, y_min, x_max, y_max]: [f64; 4]) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Can any point ever fall inside this region?
    ///
    /// Regions with components outside `[0, 1]`, non-finite components, zero
    /// area, or inverted edges are malformed.
    pub fn is_well_formed(&self) -> bool {
        let in_range = [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
        in_range && self.x_min < self.x_max && self.y_min < self.y_max
    }

    /// Does this region contain a normalized point?
    ///
    /// Intervals are half-open, `[min, max)`, so a point sitting exactly on
    /// the edge shared by two abutting regions belongs only to the region
    /// that starts there.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.is_well_formed()
            && self.x_min <= x
            && x < self.x_max
            && self.y_min <= y
            && y < self.y_max
    }
}

/// How to turn boxes into fields. Built from configuration by
/// [`crate::config::BoxMappingConfig::to_policy`].
#[derive(Clone, Debug, PartialEq)]
pub enum MappingPolicy {
    /// Field names in the order they should receive boxes.
    Sequential { field_names: Vec<String> },

    /// Field regions, in declaration order. When regions overlap, the first
    /// declared region wins.
    Positional { regions: IndexMap<String, Region> },
}

impl MappingPolicy {
    pub fn mode(&self) -> MappingMode {
        match self {
            MappingPolicy::Sequential { .. } => MappingMode::Sequential,
            MappingPolicy::Positional { .. } => MappingMode::Positional,
        }
    }

    /// The declared field names, in policy order.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            MappingPolicy::Sequential { field_names } => {
                field_names.iter().map(String::as_str).collect()
            }
            MappingPolicy::Positional { regions } => {
                regions.keys().map(String::as_str).collect()
            }
        }
    }

    /// Does this policy expect boxes in reading order?
    pub fn requires_reading_order(&self) -> bool {
        matches!(self, MappingPolicy::Sequential { .. })
    }

    /// Does this policy need to know how big the page is?
    pub fn requires_page_dimensions(&self) -> bool {
        matches!(self, MappingPolicy::Positional { .. })
    }

    /// Names of fields whose region can never match a box.
    pub fn malformed_regions(&self) -> Vec<&str> {
        match self {
            MappingPolicy::Sequential { .. } => vec![],
            MappingPolicy::Positional { regions } => regions
                .iter()
                .filter(|(_, region)| !region.is_well_formed())
                .map(|(name, _)| name.as_str())
                .collect(),
        }
    }
}

/// The box assigned to a field.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct MappedField {
    pub text: String,
    pub confidence: f64,
    pub polygon: [Point; 4],
}

impl From<DetectedBox> for MappedField {
    fn from(b: DetectedBox) -> Self {
        Self {
            text: b.text,
            confidence: b.confidence,
            polygon: b.polygon,
        }
    }
}

/// A box whose center fell inside more than one region.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct OverlappingMatch {
    /// Position of the box in the mapper's input.
    pub box_index: usize,

    /// The region that claimed the box (the first declared match).
    pub claimed_by: String,

    /// Later regions that also contained the box.
    pub also_matched: Vec<String>,
}

/// Counters and diagnostics describing one mapping run.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct MappingMetadata {
    /// The policy used.
    pub mode: MappingMode,

    /// How many boxes were given to the mapper.
    pub total_boxes_seen: usize,

    /// How many fields received a box.
    pub fields_mapped: usize,

    /// How many fields the policy declares.
    pub fields_expected: usize,

    /// Boxes that matched several regions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overlapping_matches: Vec<OverlappingMatch>,

    /// Fields whose region can never match anything.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub malformed_regions: Vec<String>,
}

/// The output of [`map_boxes`] for one page.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct MappedResult {
    /// Fields that received a box, in policy order. Fields without a box are
    /// absent.
    pub fields: IndexMap<String, MappedField>,

    /// Boxes that were not assigned to any field, in input order.
    pub unmapped_boxes: Vec<DetectedBox>,

    /// Counters and diagnostics.
    pub metadata: MappingMetadata,
}

impl MappedResult {
    /// Build a result, filling in the counters.
    fn new(
        policy: &MappingPolicy,
        total_boxes_seen: usize,
        fields: IndexMap<String, MappedField>,
        unmapped_boxes: Vec<DetectedBox>,
    ) -> Self {
        let metadata = MappingMetadata {
            mode: policy.mode(),
            total_boxes_seen,
            fields_mapped: fields.len(),
            fields_expected: policy.field_names().len(),
            overlapping_matches: vec![],
            malformed_regions: vec![],
        };
        Self {
            fields,
            unmapped_boxes,
            metadata,
        }
    }
}

/// Map boxes to fields according to `policy`.
///
/// For [`MappingPolicy::Sequential`], `boxes` must already be in reading
/// order. `page_dims` is only used by [`MappingPolicy::Positional`].
pub fn map_boxes(
    boxes: Vec<DetectedBox>,
    policy: &MappingPolicy,
    page_dims: PageDimensions,
) -> MappedResult {
    let result = match policy {
        MappingPolicy::Sequential { field_names } => {
            sequential::map_sequential(boxes, policy, field_names)
        }
        MappingPolicy::Positional { regions } => {
            positional::map_positional(boxes, policy, regions, page_dims)
        }
    };
    debug!(
        mode = policy.mode().as_str(),
        fields_mapped = result.metadata.fields_mapped,
        fields_expected = result.metadata.fields_expected,
        unmapped = result.unmapped_boxes.len(),
        "Mapped boxes to fields"
    );
    result
}
