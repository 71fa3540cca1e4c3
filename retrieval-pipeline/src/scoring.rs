use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::types::document::Document,
    utils::llm::{call_with_timeout, LanguageModel, ScoreResult},
};

/// Judges one document against a query from its title and keywords.
///
/// Content is never sent; relevance is decided on metadata alone.
#[derive(Clone)]
pub struct RelevanceScorer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl RelevanceScorer {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Returns the validated judgement, or the reason none could be obtained.
    pub async fn score(&self, query: &str, document: &Document) -> Result<ScoreResult, AppError> {
        let prompt = create_relevance_prompt(query, document);
        let judgement = call_with_timeout(
            self.timeout,
            "relevance scoring",
            self.model.score_relevance(&prompt),
        )
        .await?;

        judgement.validate()
    }
}

pub fn create_relevance_prompt(query: &str, document: &Document) -> String {
    let keywords = if document.keywords.is_empty() {
        "(none)".to_string()
    } else {
        document.keywords.join(", ")
    };

    format!(
        "Rate how relevant the document is to the query.\n\
         Query: {query}\n\
         Document title: {title}\n\
         Document keywords: {keywords}\n\
         Return a score between 0 (unrelated) and 1 (directly relevant), the document keywords \
         that match the query, and a short reasoning.",
        title = document.title,
    )
}
