use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    utils::llm::{call_with_timeout, LanguageModel},
};
use tracing::{debug, instrument};

use crate::utils::llm_instructions::create_merge_prompt;

#[derive(Debug, Clone, Default)]
pub struct MergeRequest {
    /// Empty when the target document has no content yet.
    pub original_content: String,
    pub additional_content: String,
}

/// Folds new content into existing content with a single model call.
///
/// The merged text is returned as produced; it is not checked against either input.
#[derive(Clone)]
pub struct ContentMerger {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ContentMerger {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    #[instrument(skip_all, fields(
        original_chars = request.original_content.chars().count(),
        additional_chars = request.additional_content.chars().count()
    ))]
    pub async fn merge_content(&self, request: &MergeRequest) -> Result<String, AppError> {
        let prompt = create_merge_prompt(&request.original_content, &request.additional_content);

        let merged = call_with_timeout(self.timeout, "content merge", self.model.complete_text(&prompt))
            .await
            .map_err(|err| AppError::ContentMerge(err.to_string()))?;

        debug!(merged_chars = merged.chars().count(), "merged content");
        Ok(merged)
    }
}
