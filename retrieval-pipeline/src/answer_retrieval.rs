use std::{fmt::Write as _, sync::Arc, time::Duration, time::Instant};

use common::{
    error::AppError,
    utils::llm::{call_with_timeout, LanguageModel},
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    config::RagConfig,
    context_budget::{build_context, render_content},
    RelevanceResult,
};

/// Returned without a model call when no document survives budgeting.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant documents to answer this question.";

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub query: String,
    pub relevant_results: Vec<RelevanceResult>,
    pub include_sources: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// The budgeted results the answer was grounded on.
    pub sources: Vec<RelevanceResult>,
    pub metadata: ResponseMetadata,
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    max_context_length: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: &RagConfig) -> Self {
        Self {
            model,
            max_context_length: config.max_context_length,
            timeout: config.tuning.llm_timeout,
        }
    }

    #[instrument(skip_all, fields(candidates = request.relevant_results.len()))]
    pub async fn generate_response(
        &self,
        request: GenerateRequest,
    ) -> Result<GeneratedAnswer, AppError> {
        let started = Instant::now();
        let sources = build_context(&request.relevant_results, self.max_context_length);

        let answer = if sources.is_empty() {
            NO_CONTEXT_ANSWER.to_string()
        } else {
            let prompt = create_answer_prompt(&request.query, &sources, request.include_sources);
            call_with_timeout(
                self.timeout,
                "answer generation",
                self.model.complete_text(&prompt),
            )
            .await
            .map_err(|err| AppError::ResponseGeneration(err.to_string()))?
        };

        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            sources = sources.len(),
            processing_time_ms, "generated answer"
        );

        Ok(GeneratedAnswer {
            answer,
            sources,
            metadata: ResponseMetadata { processing_time_ms },
        })
    }
}

/// Numbered reference blocks followed by the question.
pub fn create_answer_prompt(query: &str, sources: &[RelevanceResult], include_sources: bool) -> String {
    let mut references = String::new();
    for (index, source) in sources.iter().enumerate() {
        let _ = write!(
            references,
            "[{number}] {title}\n{content}\n\n",
            number = index.saturating_add(1),
            title = source.document.title,
            content = render_content(source),
        );
    }

    let citation_rule = if include_sources {
        "Cite the references you rely on by their number in square brackets, e.g. [1]."
    } else {
        "Do not mention reference numbers in the answer."
    };

    format!(
        r"
        Answer the question using only the references below. If they do not contain the answer, say so.
        {citation_rule}

        References:
        ==================
        {references}
        Question:
        ==================
        {query}
        "
    )
}
