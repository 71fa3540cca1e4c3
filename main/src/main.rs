mod args;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::{
    storage::{db::SurrealDbClient, document_store::DocumentStore},
    utils::{
        config::get_config,
        llm::{LanguageModel, OpenAiLanguageModel},
    },
};
use ingestion_pipeline::{AppendOrchestrator, AppendRequest};
use retrieval_pipeline::{
    retrieve_and_answer, AnalysisOptions, AnswerSynthesizer, RagConfig, RelevanceAnalyzer,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only JSON
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config().context("failed to load configuration")?;
    let rag_config = RagConfig::from_app_config(&config)?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .context("failed to connect to surrealdb")?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiLanguageModel::new(
        openai_client,
        rag_config.model.clone(),
        rag_config.temperature,
    ));
    info!(model = %rag_config.model, "language model configured");

    match cli.command {
        Command::CreateCorpus { title } => {
            let corpus = db.create_corpus(&title).await?;
            print_json(&corpus)?;
        }
        Command::Ask {
            corpus,
            include_sources,
            threshold,
            max_results,
            query,
        } => {
            let analyzer = RelevanceAnalyzer::new(Arc::clone(&model), rag_config.clone());
            let synthesizer = AnswerSynthesizer::new(Arc::clone(&model), &rag_config);
            let answer = retrieve_and_answer(
                &analyzer,
                &synthesizer,
                db.as_ref(),
                &query,
                &corpus,
                AnalysisOptions {
                    threshold,
                    max_results,
                },
                include_sources,
            )
            .await?;
            print_json(&answer)?;
        }
        Command::Append {
            corpus,
            target,
            content,
        } => {
            let store: Arc<dyn DocumentStore> = db;
            let orchestrator = AppendOrchestrator::new(store, model, &rag_config);
            let outcome = orchestrator
                .append_content(AppendRequest {
                    corpus_id: corpus,
                    content,
                    target_document_id: target,
                })
                .await?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
