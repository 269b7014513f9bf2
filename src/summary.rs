//! A plain-text report of a mapping run, for people rather than programs.

use std::fmt;

use crate::{
    documents::DocumentOutput,
    mapping::{MappedResult, MappingPolicy},
    pages::PageResult,
    work::{WorkOutput, WorkStatus},
};

/// Accumulates output records and renders them as text.
pub struct Summary {
    policy: MappingPolicy,
    documents: Vec<WorkOutput<DocumentOutput>>,
}

impl Summary {
    pub fn new(policy: MappingPolicy) -> Self {
        Self {
            policy,
            documents: vec![],
        }
    }

    /// Add a document to the report. Documents are reported in the order
    /// they are recorded.
    pub fn record(&mut self, output: &WorkOutput<DocumentOutput>) {
        self.documents.push(output.clone());
    }

    /// How many documents have been recorded.
    #[cfg(test)]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn fmt_page(&self, f: &mut fmt::Formatter<'_>, page: &PageResult) -> fmt::Result {
        writeln!(f, "  Page {}", page.page_number)?;
        writeln!(f, "    Fields:")?;
        for name in self.policy.field_names() {
            match page.mapped.fields.get(name) {
                Some(field) => writeln!(
                    f,
                    "      {name}: {} (confidence: {:.2})",
                    field.text, field.confidence
                )?,
                None => writeln!(f, "      {name}: [Not detected]")?,
            }
        }
        fmt_metadata(f, &page.mapped)?;
        if !page.mapped.unmapped_boxes.is_empty() {
            writeln!(f, "    Unmapped boxes:")?;
            for detected in &page.mapped.unmapped_boxes {
                writeln!(
                    f,
                    "      - {:?} (confidence: {:.2})",
                    detected.text, detected.confidence
                )?;
            }
        }
        writeln!(f, "    All detected text:")?;
        if page.filtered_boxes.is_empty() {
            writeln!(f, "      (none)")?;
        }
        for (idx, detected) in page.filtered_boxes.iter().enumerate() {
            let b = detected.bounds();
            writeln!(
                f,
                "      {}. {:?} (confidence: {:.2}) at [{:.0}, {:.0}, {:.0}, {:.0}]",
                idx + 1,
                detected.text,
                detected.confidence,
                b.min_x,
                b.min_y,
                b.max_x,
                b.max_y
            )?;
        }
        Ok(())
    }
}

fn fmt_metadata(f: &mut fmt::Formatter<'_>, mapped: &MappedResult) -> fmt::Result {
    let metadata = &mapped.metadata;
    writeln!(f, "    Metadata:")?;
    writeln!(f, "      mode: {}", metadata.mode.as_str())?;
    writeln!(f, "      total boxes: {}", metadata.total_boxes_seen)?;
    writeln!(
        f,
        "      fields mapped: {}/{}",
        metadata.fields_mapped, metadata.fields_expected
    )?;
    if !metadata.overlapping_matches.is_empty() {
        writeln!(
            f,
            "      overlapping matches: {}",
            metadata.overlapping_matches.len()
        )?;
    }
    if !metadata.malformed_regions.is_empty() {
        writeln!(
            f,
            "      malformed regions: {}",
            metadata.malformed_regions.join(", ")
        )?;
    }
    Ok(())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OCR field mapping summary")?;
        writeln!(f, "=========================")?;
        for document in &self.documents {
            writeln!(f)?;
            writeln!(
                f,
                "Document {} ({})",
                document.id,
                document.data.path.display()
            )?;
            if document.status == WorkStatus::Failed {
                writeln!(f, "  Status: failed")?;
            }
            for error in &document.errors {
                writeln!(f, "  Warning: {error}")?;
            }
            for page in &document.data.pages {
                self.fmt_page(f, page)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Value;

    use super::*;
    use crate::{
        detection::{PageDimensions, tests::box_at},
        mapping::Region,
        pages::PagePipeline,
    };

    fn document(policy: &MappingPolicy) -> WorkOutput<DocumentOutput> {
        let pipeline = PagePipeline {
            min_confidence: 0.5,
            line_tolerance: 20.0,
            policy: policy.clone(),
        };
        let page = pipeline.map_page(
            1,
            vec![
                box_at("Ada", 20.0, 20.0, 0.934),
                box_at("stray", 150.0, 150.0, 0.81),
            ],
            PageDimensions {
                width: 200,
                height: 200,
            },
        );
        WorkOutput {
            id: Value::from("doc-1"),
            status: WorkStatus::Ok,
            errors: vec![],
            data: DocumentOutput {
                path: "doc-1.json".into(),
                pages: vec![page],
            },
        }
    }

    #[test]
    fn lists_detected_and_missing_fields() {
        let mut regions = IndexMap::new();
        regions.insert("name".to_owned(), Region::from_array([0.0, 0.0, 0.5, 0.5]));
        regions.insert("date".to_owned(), Region::from_array([0.5, 0.0, 1.0, 0.5]));
        let policy = MappingPolicy::Positional { regions };

        let mut summary = Summary::new(policy.clone());
        summary.record(&document(&policy));
        let text = summary.to_string();

        assert!(text.starts_with("OCR field mapping summary\n"));
        assert!(text.contains("Document \"doc-1\" (doc-1.json)\n"));
        assert!(text.contains("      name: Ada (confidence: 0.93)\n"));
        assert!(text.contains("      date: [Not detected]\n"));
        assert!(text.contains("      mode: positional\n"));
        assert!(text.contains("      fields mapped: 1/2\n"));
        assert!(text.contains("      - \"stray\" (confidence: 0.81)\n"));
        assert!(text.contains(
            "    All detected text:\n\
             \x20     1. \"Ada\" (confidence: 0.93) at [10, 15, 30, 25]\n\
             \x20     2. \"stray\" (confidence: 0.81) at [140, 145, 160, 155]\n"
        ));
    }

    #[test]
    fn failed_documents_show_their_errors() {
        let policy = MappingPolicy::Sequential {
            field_names: vec!["a".to_owned()],
        };
        let mut summary = Summary::new(policy);
        summary.record(&WorkOutput::new_failed(
            Value::from(7),
            vec!["failed to read detections".to_owned()],
            DocumentOutput {
                path: "missing.json".into(),
                pages: vec![],
            },
        ));
        let text = summary.to_string();
        assert!(text.contains("Document 7 (missing.json)\n  Status: failed\n"));
        assert!(text.contains("  Warning: failed to read detections\n"));
        assert!(!text.contains("Page"));
    }
}
