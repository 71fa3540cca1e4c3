pub mod analyzer;
pub mod answer_retrieval;
pub mod cache;
pub mod config;
pub mod context_budget;
pub mod scoring;

use common::{
    error::AppError,
    storage::{document_store::DocumentStore, types::document::Document},
    utils::llm::ScoreResult,
};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::instrument;

pub use analyzer::{chunk_array, AnalysisOptions, RelevanceAnalyzer};
pub use answer_retrieval::{AnswerSynthesizer, GenerateRequest, GeneratedAnswer, ResponseMetadata};
pub use cache::{CacheKey, CachePolicy, ResultCache};
pub use config::{RagConfig, RagTuning};
pub use context_budget::build_context;
pub use scoring::RelevanceScorer;

/// A document judged against a query, with the score that placed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceResult {
    pub document: Document,
    pub score: f32,
    pub matched_keywords: Vec<String>,
    pub reasoning: Option<String>,
    /// Set when the context budget cut the content short.
    pub truncated: bool,
}

impl RelevanceResult {
    pub fn from_score(document: Document, score: ScoreResult) -> Self {
        let mut matched_keywords: Vec<String> = Vec::with_capacity(score.matched_keywords.len());
        for keyword in score.matched_keywords {
            if !matched_keywords.contains(&keyword) {
                matched_keywords.push(keyword);
            }
        }
        let reasoning = Some(score.reasoning).filter(|text| !text.trim().is_empty());

        Self {
            document,
            score: score.score,
            matched_keywords,
            reasoning,
            truncated: false,
        }
    }

    /// Fail-safe result for a candidate whose judgement failed.
    pub fn zero(document: Document) -> Self {
        Self::from_score(document, ScoreResult::zero())
    }

    /// Fills in content obtained by a separate document fetch.
    pub fn set_content(&mut self, content: String) {
        self.document.content = Some(content);
    }
}

/// Orders results by descending score; ties keep their incoming order.
pub fn sort_by_score_desc(results: &mut [RelevanceResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Loads full content for every result from the document store.
#[instrument(skip_all, fields(result_count = results.len()))]
pub async fn load_document_content(
    results: &mut [RelevanceResult],
    store: &dyn DocumentStore,
) -> Result<(), AppError> {
    let documents = try_join_all(
        results
            .iter()
            .map(|result| store.fetch_document(&result.document.id)),
    )
    .await?;

    for (result, document) in results.iter_mut().zip(documents) {
        result.set_content(document.content.unwrap_or_default());
    }

    Ok(())
}

/// Ask flow: score the corpus, load content for the survivors, answer from them.
#[instrument(skip_all, fields(corpus_id = %corpus_id))]
pub async fn retrieve_and_answer(
    analyzer: &RelevanceAnalyzer,
    synthesizer: &AnswerSynthesizer,
    store: &dyn DocumentStore,
    query: &str,
    corpus_id: &str,
    options: AnalysisOptions,
    include_sources: bool,
) -> Result<GeneratedAnswer, AppError> {
    let corpus = store
        .fetch_corpus(corpus_id)
        .await
        .map_err(|err| AppError::RelevanceAnalysis(format!("failed to load corpus: {err}")))?;

    let mut relevant_results = analyzer.analyze_relevance(query, &corpus, options).await?;
    load_document_content(&mut relevant_results, store).await?;

    synthesizer
        .generate_response(GenerateRequest {
            query: query.to_string(),
            relevant_results,
            include_sources,
        })
        .await
}
