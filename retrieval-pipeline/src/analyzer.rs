use std::{sync::Arc, time::Instant};

use common::{
    error::AppError,
    storage::types::{corpus::Corpus, document::Document},
    utils::llm::{LanguageModel, ScoreResult},
};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{CacheKey, CachePolicy, ResultCache},
    config::RagConfig,
    scoring::RelevanceScorer,
    sort_by_score_desc, RelevanceResult,
};

const ANALYZE_OPERATION: &str = "analyze_relevance";

/// Per-call overrides; `None` falls back to the configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisOptions {
    pub threshold: Option<f32>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct EffectiveOptions {
    threshold: f32,
    max_results: usize,
}

/// Splits `items` into consecutive chunks of at most `size` elements.
pub fn chunk_array<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Scores a whole corpus against a query in paced, concurrent batches.
pub struct RelevanceAnalyzer {
    scorer: RelevanceScorer,
    config: RagConfig,
    cache: Arc<ResultCache<Vec<RelevanceResult>>>,
}

impl RelevanceAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, config: RagConfig) -> Self {
        let cache = Arc::new(ResultCache::new(CachePolicy {
            ttl: config.tuning.cache_ttl,
            capacity: config.tuning.cache_capacity,
        }));
        Self::with_cache(model, config, cache)
    }

    pub fn with_cache(
        model: Arc<dyn LanguageModel>,
        config: RagConfig,
        cache: Arc<ResultCache<Vec<RelevanceResult>>>,
    ) -> Self {
        let scorer = RelevanceScorer::new(model, config.tuning.llm_timeout);
        Self {
            scorer,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Relevant documents for `query`, best first, filtered by threshold and capped in count.
    #[instrument(skip_all, fields(corpus_id = %corpus.id, candidates = corpus.documents.len()))]
    pub async fn analyze_relevance(
        &self,
        query: &str,
        corpus: &Corpus,
        options: AnalysisOptions,
    ) -> Result<Vec<RelevanceResult>, AppError> {
        let effective = self.resolve_options(options)?;

        if !self.config.cache_enabled {
            return self.run_analysis(query, &corpus.documents, effective).await;
        }

        let key = CacheKey::new(ANALYZE_OPERATION, query, &corpus.id, &effective).map_err(|err| {
            AppError::RelevanceAnalysis(format!("failed to build cache key: {err}"))
        })?;

        let results = self
            .cache
            .get_or_try_compute(key, || self.run_analysis(query, &corpus.documents, effective))
            .await?;

        Ok(results.as_ref().clone())
    }

    fn resolve_options(&self, options: AnalysisOptions) -> Result<EffectiveOptions, AppError> {
        let threshold = options
            .threshold
            .unwrap_or(self.config.relevance_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Validation(format!(
                "threshold {threshold} must lie within [0, 1]"
            )));
        }

        Ok(EffectiveOptions {
            threshold,
            max_results: options.max_results.unwrap_or(self.config.max_results),
        })
    }

    async fn run_analysis(
        &self,
        query: &str,
        documents: &[Document],
        options: EffectiveOptions,
    ) -> Result<Vec<RelevanceResult>, AppError> {
        let started = Instant::now();
        let chunks = chunk_array(documents, self.config.batch_size);
        let chunk_count = chunks.len();
        let mut results = Vec::with_capacity(documents.len());

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let scored = match self.score_chunk(query, &chunk).await {
                Ok(outcomes) => chunk
                    .into_iter()
                    .zip(outcomes)
                    .map(|(document, outcome)| resolve_candidate(document, outcome))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    warn!(
                        chunk_index,
                        chunk_len = chunk.len(),
                        error = %err,
                        "scoring batch failed; scoring the whole batch as zero"
                    );
                    chunk.into_iter().map(RelevanceResult::zero).collect()
                }
            };
            debug!(chunk_index, scored = scored.len(), "scored batch");
            results.extend(scored);

            if chunk_index.saturating_add(1) < chunk_count {
                tokio::time::sleep(self.config.tuning.batch_pacing).await;
            }
        }

        let scored_count = results.len();
        results.retain(|result| result.score >= options.threshold);
        sort_by_score_desc(&mut results);
        results.truncate(options.max_results);

        info!(
            scored_count,
            kept = results.len(),
            batches = chunk_count,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "relevance analysis finished"
        );

        Ok(results)
    }

    /// Scores every candidate of one batch concurrently and waits for all of them.
    ///
    /// The outer error means the batch as a whole broke down (a scoring task panicked or
    /// was cancelled); per-candidate failures are in the inner results. Tasks still running
    /// when this returns early or is dropped are aborted.
    async fn score_chunk(
        &self,
        query: &str,
        chunk: &[Document],
    ) -> Result<Vec<Result<ScoreResult, AppError>>, JoinError> {
        let handles: Vec<JoinHandle<Result<ScoreResult, AppError>>> = chunk
            .iter()
            .map(|document| {
                let scorer = self.scorer.clone();
                let query = query.to_owned();
                let document = document.clone();
                tokio::spawn(async move { scorer.score(&query, &document).await })
            })
            .collect();
        let _batch = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

        try_join_all(handles).await
    }
}

/// Aborts the tasks of a batch once it is no longer awaited.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Folds a failed judgement into a zero score so one bad candidate cannot sink the analysis.
fn resolve_candidate(
    document: Document,
    outcome: Result<ScoreResult, AppError>,
) -> RelevanceResult {
    match outcome {
        Ok(score) => RelevanceResult::from_score(document, score),
        Err(err) => {
            warn!(
                document_id = %document.id,
                error = %err,
                "relevance scoring failed; using zero score"
            );
            RelevanceResult::zero(document)
        }
    }
}
