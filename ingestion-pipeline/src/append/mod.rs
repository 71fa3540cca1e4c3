mod state;

use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        document_store::DocumentStore,
        types::document::{Document, DocumentPatch, NewDocument},
    },
    utils::llm::{call_with_timeout, LanguageModel},
};
use retrieval_pipeline::{AnalysisOptions, RagConfig, RelevanceAnalyzer};
use serde::Serialize;
use state_machines::core::GuardError;
use tracing::{info, instrument};

use self::state::received;
use crate::{
    merger::{ContentMerger, MergeRequest},
    utils::llm_instructions::{
        clean_title, create_keywords_prompt, create_title_prompt, parse_keywords,
    },
};

/// Threshold used when looking for a document to absorb appended content.
pub const APPEND_RELEVANCE_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct AppendRequest {
    pub corpus_id: String,
    pub content: String,
    /// Skips relevance analysis and merges straight into this document.
    pub target_document_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendOutcome {
    pub document_id: String,
    pub title: String,
    pub message: String,
    pub action: AppendAction,
}

impl AppendOutcome {
    fn created(document: &Document) -> Self {
        Self {
            document_id: document.id.clone(),
            title: document.title.clone(),
            message: format!("Created new document \"{}\"", document.title),
            action: AppendAction::Created,
        }
    }

    fn updated(document: &Document) -> Self {
        Self {
            document_id: document.id.clone(),
            title: document.title.clone(),
            message: format!("Appended content to document \"{}\"", document.title),
            action: AppendAction::Updated,
        }
    }
}

/// Places new content into a corpus: merged into a chosen or matching document, or stored as a new one.
pub struct AppendOrchestrator {
    store: Arc<dyn DocumentStore>,
    model: Arc<dyn LanguageModel>,
    analyzer: RelevanceAnalyzer,
    merger: ContentMerger,
    timeout: Duration,
}

impl AppendOrchestrator {
    /// Target selection always scores the current corpus, so the analyzer built here never caches.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn LanguageModel>,
        config: &RagConfig,
    ) -> Self {
        let timeout = config.tuning.llm_timeout;
        let analyzer = RelevanceAnalyzer::new(
            Arc::clone(&model),
            RagConfig {
                cache_enabled: false,
                ..config.clone()
            },
        );
        let merger = ContentMerger::new(Arc::clone(&model), timeout);

        Self {
            store,
            model,
            analyzer,
            merger,
            timeout,
        }
    }

    #[instrument(skip_all, fields(corpus_id = %request.corpus_id, explicit_target = request.target_document_id.is_some()))]
    pub async fn append_content(&self, request: AppendRequest) -> Result<AppendOutcome, AppError> {
        validate(&request)?;
        let machine = received();

        let target = match request.target_document_id.as_deref() {
            Some(document_id) => Some(document_id.to_string()),
            None => self
                .select_target(&request)
                .await
                .map_err(|err| append_failure("selecting a target document", err))?,
        };

        if let Some(document_id) = target {
            let machine = machine
                .target()
                .map_err(|(_, guard)| map_guard_error("target", &guard))?;
            let document = self
                .merge_into(&request.corpus_id, &document_id, &request.content)
                .await
                .map_err(|err| append_failure("merging into existing document", err))?;
            let _machine = machine
                .merge()
                .map_err(|(_, guard)| map_guard_error("merge", &guard))?;

            info!(document_id = %document.id, "appended content to existing document");
            return Ok(AppendOutcome::updated(&document));
        }

        let machine = machine
            .draft()
            .map_err(|(_, guard)| map_guard_error("draft", &guard))?;
        let document = self
            .create_from_content(&request)
            .await
            .map_err(|err| append_failure("creating a new document", err))?;
        let _machine = machine
            .create()
            .map_err(|(_, guard)| map_guard_error("create", &guard))?;

        info!(document_id = %document.id, title = %document.title, "created document for appended content");
        Ok(AppendOutcome::created(&document))
    }

    /// Best matching document id, if any reaches the append threshold.
    async fn select_target(&self, request: &AppendRequest) -> Result<Option<String>, AppError> {
        let corpus = self.store.fetch_corpus(&request.corpus_id).await?;
        let results = self
            .analyzer
            .analyze_relevance(
                &request.content,
                &corpus,
                AnalysisOptions {
                    threshold: Some(APPEND_RELEVANCE_THRESHOLD),
                    max_results: Some(1),
                },
            )
            .await?;

        Ok(results.into_iter().next().map(|result| result.document.id))
    }

    async fn merge_into(
        &self,
        corpus_id: &str,
        document_id: &str,
        content: &str,
    ) -> Result<Document, AppError> {
        let current = self.store.fetch_document(document_id).await?;
        if current.corpus_id != corpus_id {
            return Err(AppError::Validation(format!(
                "document {document_id} does not belong to corpus {corpus_id}"
            )));
        }
        let merged = self
            .merger
            .merge_content(&MergeRequest {
                original_content: current.content.unwrap_or_default(),
                additional_content: content.to_string(),
            })
            .await?;

        self.store
            .update_document(document_id, DocumentPatch::content(merged))
            .await
    }

    async fn create_from_content(&self, request: &AppendRequest) -> Result<Document, AppError> {
        let (title, keywords) = tokio::try_join!(
            self.generate_title(&request.content),
            self.generate_keywords(&request.content)
        )?;

        self.store
            .create_document(NewDocument {
                corpus_id: request.corpus_id.clone(),
                title,
                keywords,
                content: request.content.clone(),
            })
            .await
    }

    async fn generate_title(&self, content: &str) -> Result<String, AppError> {
        let prompt = create_title_prompt(content);
        let raw = call_with_timeout(self.timeout, "title generation", self.model.complete_text(&prompt)).await?;
        Ok(clean_title(&raw))
    }

    async fn generate_keywords(&self, content: &str) -> Result<Vec<String>, AppError> {
        let prompt = create_keywords_prompt(content);
        let raw = call_with_timeout(self.timeout, "keyword generation", self.model.complete_text(&prompt)).await?;
        Ok(parse_keywords(&raw))
    }
}

fn validate(request: &AppendRequest) -> Result<(), AppError> {
    if request.corpus_id.trim().is_empty() {
        return Err(AppError::Validation("corpus id is required".into()));
    }
    if request.content.trim().is_empty() {
        return Err(AppError::Validation("content is required".into()));
    }
    if matches!(request.target_document_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(AppError::Validation("target document id must not be blank".into()));
    }
    Ok(())
}

/// Wraps downstream failures with the stage they happened in; validation errors pass through.
fn append_failure(stage: &str, err: AppError) -> AppError {
    match err {
        AppError::Validation(_) => err,
        other => AppError::Append(format!("{stage}: {other}")),
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid append transition during {event}: {guard:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        storage::db::SurrealDbClient,
        utils::llm::{mock::ScriptedLanguageModel, ScoreResult},
    };
    use uuid::Uuid;

    const MERGED: &str = "merged body";

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    async fn seed(db: &SurrealDbClient, corpus_id: &str, title: &str, content: &str) -> Document {
        db.create_document(NewDocument {
            corpus_id: corpus_id.to_string(),
            title: title.to_string(),
            keywords: vec![title.to_lowercase()],
            content: content.to_string(),
        })
        .await
        .expect("seed document")
    }

    fn score(value: f32) -> ScoreResult {
        ScoreResult {
            score: value,
            ..ScoreResult::zero()
        }
    }

    /// Answers merge, title and keyword prompts by their wording.
    fn completions(prompt: &str) -> Result<String, AppError> {
        if prompt.contains("Merge the two texts") {
            Ok(MERGED.to_string())
        } else if prompt.contains("concise title") {
            Ok("\"Meeting Notes\"".to_string())
        } else if prompt.contains("keywords") {
            Ok("meeting, notes, Meeting".to_string())
        } else {
            Err(AppError::InternalError("unexpected prompt".into()))
        }
    }

    fn orchestrator(db: &Arc<SurrealDbClient>, model: &Arc<ScriptedLanguageModel>) -> AppendOrchestrator {
        AppendOrchestrator::new(db.clone(), model.clone(), &RagConfig::default())
    }

    #[tokio::test]
    async fn explicit_target_merges_without_analysis() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let target = seed(&db, &corpus.id, "Plan", "ship in May").await;
        let model = Arc::new(
            ScriptedLanguageModel::new()
                .with_scores(|_| Err(AppError::InternalError("scoring must not run".into())))
                .with_completions(completions),
        );

        let outcome = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "note".into(),
                target_document_id: Some(target.id.clone()),
            })
            .await
            .expect("append");

        assert_eq!(outcome.action, AppendAction::Updated);
        assert_eq!(outcome.document_id, target.id);
        assert_eq!(outcome.title, "Plan");
        assert_eq!(model.score_calls(), 0);

        let prompt = model.completion_prompts().pop().expect("merge prompt");
        assert!(prompt.contains("ship in May"));
        assert!(prompt.contains("note"));

        let stored = db.fetch_document(&target.id).await.expect("fetch");
        assert_eq!(stored.content.as_deref(), Some(MERGED));
    }

    #[tokio::test]
    async fn empty_corpus_creates_named_document() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let model = Arc::new(ScriptedLanguageModel::new().with_completions(completions));

        let outcome = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "note".into(),
                target_document_id: None,
            })
            .await
            .expect("append");

        assert_eq!(outcome.action, AppendAction::Created);
        assert_eq!(outcome.title, "Meeting Notes");
        assert!(outcome.message.contains("Created"));
        assert_eq!(model.score_calls(), 0);
        assert_eq!(model.completion_calls(), 2);

        let stored = db.fetch_document(&outcome.document_id).await.expect("fetch");
        assert_eq!(stored.corpus_id, corpus.id);
        assert_eq!(stored.keywords, vec!["meeting", "notes"]);
        assert_eq!(stored.content.as_deref(), Some("note"));
    }

    #[tokio::test]
    async fn best_match_above_threshold_absorbs_content() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let plan = seed(&db, &corpus.id, "Plan", "ship in May").await;
        let recipes = seed(&db, &corpus.id, "Recipes", "pancakes").await;
        let model = Arc::new(
            ScriptedLanguageModel::new()
                .with_scores(|prompt| {
                    Ok(score(if prompt.contains("Document title: Plan") { 0.2 } else { 0.05 }))
                })
                .with_completions(completions),
        );

        let outcome = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "launch moved to June".into(),
                target_document_id: None,
            })
            .await
            .expect("append");

        assert_eq!(outcome.action, AppendAction::Updated);
        assert_eq!(outcome.document_id, plan.id);
        assert_eq!(model.score_calls(), 2);

        let updated = db.fetch_document(&plan.id).await.expect("plan");
        assert_eq!(updated.content.as_deref(), Some(MERGED));
        let untouched = db.fetch_document(&recipes.id).await.expect("recipes");
        assert_eq!(untouched.content.as_deref(), Some("pancakes"));
    }

    #[tokio::test]
    async fn nothing_above_threshold_creates_document() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let existing = seed(&db, &corpus.id, "Recipes", "pancakes").await;
        let model = Arc::new(
            ScriptedLanguageModel::new()
                .with_scores(|_| Ok(score(0.05)))
                .with_completions(completions),
        );

        let outcome = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "quarterly meeting notes".into(),
                target_document_id: None,
            })
            .await
            .expect("append");

        assert_eq!(outcome.action, AppendAction::Created);
        assert_ne!(outcome.document_id, existing.id);
        let corpus = db.fetch_corpus(&corpus.id).await.expect("corpus");
        assert_eq!(corpus.documents.len(), 2);
    }

    #[tokio::test]
    async fn repeated_appends_see_fresh_corpus() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let model = Arc::new(
            ScriptedLanguageModel::new()
                .with_scores(|_| Ok(score(0.9)))
                .with_completions(completions),
        );
        let orchestrator = orchestrator(&db, &model);
        let request = AppendRequest {
            corpus_id: corpus.id.clone(),
            content: "note".into(),
            target_document_id: None,
        };

        let first = orchestrator.append_content(request.clone()).await.expect("first");
        let second = orchestrator.append_content(request).await.expect("second");

        assert_eq!(first.action, AppendAction::Created);
        assert_eq!(second.action, AppendAction::Updated);
        assert_eq!(second.document_id, first.document_id);
    }

    #[tokio::test]
    async fn blank_inputs_are_validation_errors() {
        let db = memory_db().await;
        let model = Arc::new(ScriptedLanguageModel::new());
        let orchestrator = orchestrator(&db, &model);

        let missing_corpus = orchestrator
            .append_content(AppendRequest {
                corpus_id: " ".into(),
                content: "note".into(),
                target_document_id: None,
            })
            .await
            .expect_err("corpus id required");
        let missing_content = orchestrator
            .append_content(AppendRequest {
                corpus_id: "c".into(),
                content: String::new(),
                target_document_id: None,
            })
            .await
            .expect_err("content required");

        assert_eq!(missing_corpus.code(), "VALIDATION_ERROR");
        assert_eq!(missing_content.code(), "VALIDATION_ERROR");
        assert_eq!(model.score_calls() + model.completion_calls(), 0);
    }

    #[tokio::test]
    async fn merge_failure_is_append_failure() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let target = seed(&db, &corpus.id, "Plan", "ship in May").await;
        let model = Arc::new(
            ScriptedLanguageModel::new()
                .with_completions(|_| Err(AppError::InternalError("model offline".into()))),
        );

        let err = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "note".into(),
                target_document_id: Some(target.id.clone()),
            })
            .await
            .expect_err("merge fails");

        assert_eq!(err.code(), "APPEND_FAILED");
        assert!(err.to_string().contains("Content merge failed"));
        assert!(err.to_string().contains("model offline"));
        let stored = db.fetch_document(&target.id).await.expect("fetch");
        assert_eq!(stored.content.as_deref(), Some("ship in May"));
    }

    #[tokio::test]
    async fn target_from_another_corpus_is_rejected() {
        let db = memory_db().await;
        let notes = db.create_corpus("Notes").await.expect("notes corpus");
        let archive = db.create_corpus("Archive").await.expect("archive corpus");
        let foreign = seed(&db, &archive.id, "Old plan", "ship in March").await;
        let model = Arc::new(ScriptedLanguageModel::new().with_completions(completions));

        let err = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: notes.id.clone(),
                content: "note".into(),
                target_document_id: Some(foreign.id.clone()),
            })
            .await
            .expect_err("document belongs to another corpus");

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(model.completion_calls(), 0);
        let stored = db.fetch_document(&foreign.id).await.expect("fetch");
        assert_eq!(stored.content.as_deref(), Some("ship in March"));
    }

    #[tokio::test]
    async fn unknown_target_is_append_failure() {
        let db = memory_db().await;
        let corpus = db.create_corpus("Notes").await.expect("corpus");
        let model = Arc::new(ScriptedLanguageModel::new().with_completions(completions));

        let err = orchestrator(&db, &model)
            .append_content(AppendRequest {
                corpus_id: corpus.id.clone(),
                content: "note".into(),
                target_document_id: Some("missing".into()),
            })
            .await
            .expect_err("target does not exist");

        assert_eq!(err.code(), "APPEND_FAILED");
        assert_eq!(model.completion_calls(), 0);
    }
}
