use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_rag_model")]
    pub rag_model: String,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// Zero disables expiry.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_batch_pacing_ms")]
    pub batch_pacing_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_rag_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_relevance_threshold() -> f32 {
    0.3
}

fn default_max_context_length() -> usize {
    4000
}

fn default_batch_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_results() -> usize {
    20
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_cache_capacity() -> usize {
    256
}

fn default_batch_pacing_ms() -> u64 {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "rag".to_string(),
            surrealdb_database: "rag".to_string(),
            rag_model: default_rag_model(),
            relevance_threshold: default_relevance_threshold(),
            max_context_length: default_max_context_length(),
            batch_size: default_batch_size(),
            cache_enabled: default_true(),
            temperature: default_temperature(),
            max_results: default_max_results(),
            llm_timeout_secs: default_llm_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            batch_pacing_ms: default_batch_pacing_ms(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
