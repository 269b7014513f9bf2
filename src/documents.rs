//! Mapping whole documents: one detections file in, one output record out.

use std::sync::Arc;

use futures::{FutureExt as _, StreamExt as _};
use schemars::JsonSchema;

use crate::{
    async_utils::{
        BoxedFuture, BoxedStream, io::read_json_or_toml,
        spawn_blocking_propagating_panics,
    },
    detection::Detections,
    pages::{PagePipeline, PageResult},
    prelude::*,
    work::{WorkInput, WorkOutput, WorkStatus},
};

/// An input record describing a document to map.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DocumentInput {
    /// Path to the detections file (JSON or TOML) for this document.
    pub path: PathBuf,
}

/// An output record describing a mapped document.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentOutput {
    /// The detections file we read.
    pub path: PathBuf,

    /// One result per page, in page order. Empty if the document failed.
    pub pages: Vec<PageResult>,
}

/// Map a stream of documents.
///
/// Returns a stream of futures, one per input record, so the caller can
/// choose how many documents to process at once. Resolving it with
/// [`futures::StreamExt::buffered`] keeps outputs in input order.
pub fn map_documents(
    input: BoxedStream<Result<WorkInput<DocumentInput>>>,
    pipeline: Arc<PagePipeline>,
) -> BoxedStream<BoxedFuture<Result<WorkOutput<DocumentOutput>>>> {
    input
        .map(move |document| {
            let pipeline = pipeline.clone();
            async move {
                let document = document?;
                Ok(map_document(document, pipeline).await)
            }
            .boxed()
        })
        .boxed()
}

/// Map a single document.
///
/// Problems with this document are recorded in the output rather than
/// returned, so that one unreadable file doesn't abort the batch.
#[instrument(level = "debug", skip_all, fields(id = %input.id))]
pub async fn map_document(
    input: WorkInput<DocumentInput>,
    pipeline: Arc<PagePipeline>,
) -> WorkOutput<DocumentOutput> {
    let id = input.id.clone();
    let path = input.data.path.clone();
    match map_document_inner(input, pipeline).await {
        Ok(output) => output,
        Err(err) => {
            error!(path = %path.display(), "Could not map document: {err:?}");
            WorkOutput::new_failed(
                id,
                vec![format!("{:?}", err)],
                DocumentOutput {
                    path,
                    pages: vec![],
                },
            )
        }
    }
}

/// Perform the actual work for [`map_document`].
async fn map_document_inner(
    input: WorkInput<DocumentInput>,
    pipeline: Arc<PagePipeline>,
) -> Result<WorkOutput<DocumentOutput>> {
    let path = input.data.path;
    let detections = read_json_or_toml::<Detections>(&path)
        .await
        .with_context(|| format!("failed to read detections from {:?}", path))?;
    let base_dir = path.parent().map(Path::to_owned).unwrap_or_default();

    // Image probing and mapping are CPU and disk bound, so keep them off the
    // async executor.
    let pages = spawn_blocking_propagating_panics(move || -> Result<Vec<PageResult>> {
        let mut inputs = Vec::with_capacity(detections.pages.len());
        for (idx, page) in detections.pages.into_iter().enumerate() {
            let dims = if pipeline.policy.requires_page_dimensions() {
                page.dimensions(&base_dir).with_context(|| {
                    format!("cannot determine the size of page {}", idx + 1)
                })?
            } else {
                page.explicit_dimensions().unwrap_or_default()
            };
            inputs.push((page.boxes, dims));
        }
        Ok(pipeline.map_pages(inputs))
    })
    .await?;

    let mut errors = vec![];
    if pages.is_empty() {
        warn!(path = %path.display(), "Document has no pages");
        errors.push("document has no pages".to_owned());
    }
    errors.extend(pages.iter().filter_map(PageResult::empty_page_warning));

    Ok(WorkOutput {
        id: input.id,
        status: WorkStatus::Ok,
        errors,
        data: DocumentOutput { path, pages },
    })
}
