//! Deterministic `LanguageModel` for tests.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{LanguageModel, ScoreResult};
use crate::error::AppError;

type ScoreFn = dyn Fn(&str) -> Result<ScoreResult, AppError> + Send + Sync;
type CompleteFn = dyn Fn(&str) -> Result<String, AppError> + Send + Sync;

/// Scripted model that answers through closures and records every prompt it sees.
pub struct ScriptedLanguageModel {
    score_fn: Box<ScoreFn>,
    complete_fn: Box<CompleteFn>,
    delay: Option<Duration>,
    score_prompts: Mutex<Vec<(Instant, String)>>,
    completion_prompts: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self {
            score_fn: Box::new(|_| Ok(ScoreResult::zero())),
            complete_fn: Box::new(|_| Ok(String::new())),
            delay: None,
            score_prompts: Mutex::new(Vec::new()),
            completion_prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_scores<F>(mut self, score_fn: F) -> Self
    where
        F: Fn(&str) -> Result<ScoreResult, AppError> + Send + Sync + 'static,
    {
        self.score_fn = Box::new(score_fn);
        self
    }

    #[must_use]
    pub fn with_completions<F>(mut self, complete_fn: F) -> Self
    where
        F: Fn(&str) -> Result<String, AppError> + Send + Sync + 'static,
    {
        self.complete_fn = Box::new(complete_fn);
        self
    }

    /// Every call sleeps this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn score_calls(&self) -> usize {
        lock(&self.score_prompts).len()
    }

    pub fn score_prompts(&self) -> Vec<String> {
        lock(&self.score_prompts)
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    /// Instants at which scoring calls started, in arrival order.
    pub fn score_call_instants(&self) -> Vec<Instant> {
        lock(&self.score_prompts)
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn completion_calls(&self) -> usize {
        lock(&self.completion_prompts).len()
    }

    pub fn completion_prompts(&self) -> Vec<String> {
        lock(&self.completion_prompts).clone()
    }
}

impl Default for ScriptedLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn score_relevance(&self, prompt: &str) -> Result<ScoreResult, AppError> {
        lock(&self.score_prompts).push((Instant::now(), prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.score_fn)(prompt)
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, AppError> {
        lock(&self.completion_prompts).push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.complete_fn)(prompt)
    }
}
