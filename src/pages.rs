//! Running the filter, sorter and mapper over each page of a document.

use schemars::JsonSchema;

use crate::{
    detection::{DetectedBox, PageDimensions},
    mapping::{MappedResult, MappingPolicy, map_boxes},
    prelude::*,
    reading_order::{filter_by_confidence, sort_reading_order},
};

/// Everything needed to map one page, with no ambient state.
#[derive(Clone, Debug)]
pub struct PagePipeline {
    /// Boxes below this confidence are dropped before mapping.
    pub min_confidence: f64,

    /// Line band height for reading-order sorting, in pixels.
    pub line_tolerance: f64,

    /// How boxes become fields.
    pub policy: MappingPolicy,
}

/// The result of mapping one page.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: usize,

    /// How many boxes the recognizer reported.
    pub raw_box_count: usize,

    /// How many boxes survived the confidence filter.
    pub filtered_box_count: usize,

    /// Every box that survived the confidence filter, in reading order.
    pub filtered_boxes: Vec<DetectedBox>,

    /// The mapped fields.
    #[serde(flatten)]
    pub mapped: MappedResult,
}

impl PageResult {
    /// Describe why this page produced nothing, if it did.
    pub fn empty_page_warning(&self) -> Option<String> {
        if self.raw_box_count == 0 {
            Some(format!("page {}: no text detected", self.page_number))
        } else if self.filtered_box_count == 0 {
            Some(format!(
                "page {}: all {} boxes were below the confidence threshold",
                self.page_number, self.raw_box_count
            ))
        } else {
            None
        }
    }
}

impl PagePipeline {
    /// Map a single page: filter, sort if the policy needs reading order,
    /// then assign fields.
    #[instrument(level = "debug", skip_all, fields(page = page_number))]
    pub fn map_page(
        &self,
        page_number: usize,
        boxes: Vec<DetectedBox>,
        page_dims: PageDimensions,
    ) -> PageResult {
        let raw_box_count = boxes.len();
        let boxes = filter_by_confidence(boxes, self.min_confidence);
        let filtered_box_count = boxes.len();
        let (filtered_boxes, boxes) = if self.policy.requires_reading_order() {
            let sorted = sort_reading_order(boxes, self.line_tolerance);
            (sorted.clone(), sorted)
        } else {
            // Positional mapping sees boxes in input order.
            (sort_reading_order(boxes.clone(), self.line_tolerance), boxes)
        };
        let result = PageResult {
            page_number,
            raw_box_count,
            filtered_box_count,
            filtered_boxes,
            mapped: map_boxes(boxes, &self.policy, page_dims),
        };
        if let Some(warning) = result.empty_page_warning() {
            warn!("{warning}");
        }
        result
    }

    /// Map every page independently. Results are in page order, numbered
    /// from 1.
    pub fn map_pages<I>(&self, pages: I) -> Vec<PageResult>
    where
        I: IntoIterator<Item = (Vec<DetectedBox>, PageDimensions)>,
    {
        pages
            .into_iter()
            .enumerate()
            .map(|(idx, (boxes, dims))| self.map_page(idx + 1, boxes, dims))
            .collect()
    }
}
