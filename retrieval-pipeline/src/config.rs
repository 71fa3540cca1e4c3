use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};

/// Timing and cache knobs that rarely need changing.
#[derive(Debug, Clone)]
pub struct RagTuning {
    /// Pause between consecutive scoring batches.
    pub batch_pacing: Duration,
    /// Upper bound for any single model call.
    pub llm_timeout: Duration,
    /// `None` keeps cached analyses until evicted for capacity.
    pub cache_ttl: Option<Duration>,
    pub cache_capacity: usize,
}

impl Default for RagTuning {
    fn default() -> Self {
        Self {
            batch_pacing: Duration::from_millis(100),
            llm_timeout: Duration::from_secs(30),
            cache_ttl: Some(Duration::from_secs(15 * 60)),
            cache_capacity: 256,
        }
    }
}

/// Settings fixed for the lifetime of the pipelines built from them.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub model: String,
    pub relevance_threshold: f32,
    /// Character budget for packed context.
    pub max_context_length: usize,
    pub batch_size: usize,
    pub cache_enabled: bool,
    pub temperature: f32,
    pub max_results: usize,
    pub tuning: RagTuning,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            relevance_threshold: 0.3,
            max_context_length: 4000,
            batch_size: 10,
            cache_enabled: true,
            temperature: 0.3,
            max_results: 20,
            tuning: RagTuning::default(),
        }
    }
}

impl RagConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        let rag = Self {
            model: config.rag_model.clone(),
            relevance_threshold: config.relevance_threshold,
            max_context_length: config.max_context_length,
            batch_size: config.batch_size,
            cache_enabled: config.cache_enabled,
            temperature: config.temperature,
            max_results: config.max_results,
            tuning: RagTuning {
                batch_pacing: Duration::from_millis(config.batch_pacing_ms),
                llm_timeout: Duration::from_secs(config.llm_timeout_secs),
                cache_ttl: (config.cache_ttl_secs > 0)
                    .then(|| Duration::from_secs(config.cache_ttl_secs)),
                cache_capacity: config.cache_capacity,
            },
        };
        rag.validate()?;
        Ok(rag)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.batch_size == 0 {
            return Err(AppError::Validation(
                "batch_size must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(AppError::Validation(format!(
                "relevance_threshold {} must lie within [0, 1]",
                self.relevance_threshold
            )));
        }
        if self.tuning.cache_capacity == 0 {
            return Err(AppError::Validation(
                "cache_capacity must be greater than zero".into(),
            ));
        }
        if self.tuning.llm_timeout.is_zero() {
            return Err(AppError::Validation(
                "llm_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
