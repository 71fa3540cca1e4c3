//! Boundary to the generative model.
//!
//! Responses are parsed into typed values here and range-checked once by the relevance scorer.

mod openai;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use openai::OpenAiLanguageModel;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Schema-constrained relevance judgement for a single prompt.
    async fn score_relevance(&self, prompt: &str) -> Result<ScoreResult, AppError>;

    /// Free-form completion, used for merging, answering and naming.
    async fn complete_text(&self, prompt: &str) -> Result<String, AppError>;
}

/// Structured output of a relevance judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f32,
    pub matched_keywords: Vec<String>,
    pub reasoning: String,
}

impl ScoreResult {
    /// Fail-safe value used when a judgement could not be obtained.
    pub fn zero() -> Self {
        Self {
            score: 0.0,
            matched_keywords: Vec::new(),
            reasoning: String::new(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|e| {
            AppError::LLMParsing(format!("Failed to parse relevance response: {e}"))
        })
    }

    /// Rejects scores that are not finite or fall outside `[0, 1]`.
    pub fn validate(self) -> Result<Self, AppError> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(AppError::LLMParsing(format!(
                "relevance score {} outside [0, 1]",
                self.score
            )));
        }
        Ok(self)
    }
}

/// Bounds a model call; an elapsed deadline becomes `AppError::Timeout`.
///
/// Dropping the returned future cancels the underlying request.
pub async fn call_with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        AppError::Timeout(format!(
            "{operation} did not finish within {}ms",
            limit.as_millis()
        ))
    })?
}

pub fn get_relevance_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "score": {
                "type": "number",
                "description": "Relevance between 0 and 1"
            },
            "matched_keywords": {
                "type": "array",
                "items": { "type": "string" }
            },
            "reasoning": { "type": "string" }
        },
        "required": ["score", "matched_keywords", "reasoning"],
        "additionalProperties": false
    })
}
