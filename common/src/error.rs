use std::fmt;

use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Coarse origin of a failure, surfaced alongside the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Analysis,
    Merge,
    Generation,
    Llm,
    System,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorSource::Analysis => "analysis",
            ErrorSource::Merge => "merge",
            ErrorSource::Generation => "generation",
            ErrorSource::Llm => "llm",
            ErrorSource::System => "system",
        };
        f.write_str(label)
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Relevance analysis failed: {0}")]
    RelevanceAnalysis(String),
    #[error("Content merge failed: {0}")]
    ContentMerge(String),
    #[error("Response generation failed: {0}")]
    ResponseGeneration(String),
    #[error("Append failed: {0}")]
    Append(String),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("LLM call timed out: {0}")]
    Timeout(String),
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Stable machine-readable code for callers that map failures to responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::RelevanceAnalysis(_) => "RELEVANCE_ANALYSIS_FAILED",
            AppError::ContentMerge(_) => "CONTENT_MERGE_FAILED",
            AppError::ResponseGeneration(_) => "RESPONSE_GENERATION_FAILED",
            AppError::Append(_) => "APPEND_FAILED",
            AppError::OpenAI(_) => "LLM_REQUEST_FAILED",
            AppError::LLMParsing(_) => "LLM_PARSING_FAILED",
            AppError::Timeout(_) => "LLM_TIMEOUT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Join(_) => "TASK_JOIN_FAILED",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn source_tag(&self) -> ErrorSource {
        match self {
            AppError::RelevanceAnalysis(_) => ErrorSource::Analysis,
            AppError::ContentMerge(_) => ErrorSource::Merge,
            AppError::ResponseGeneration(_) => ErrorSource::Generation,
            AppError::OpenAI(_) | AppError::LLMParsing(_) | AppError::Timeout(_) => {
                ErrorSource::Llm
            }
            AppError::Append(_)
            | AppError::Database(_)
            | AppError::NotFound(_)
            | AppError::Validation(_)
            | AppError::Config(_)
            | AppError::Join(_)
            | AppError::Serialization(_)
            | AppError::InternalError(_) => ErrorSource::System,
        }
    }
}
