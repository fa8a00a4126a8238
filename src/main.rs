use std::sync::Arc;

use revenue_copilot::api::{AppState, build_router};
use revenue_copilot::config::CopilotConfig;
use revenue_copilot::dealflow::DealflowAgent;
use revenue_copilot::intent::IntentClassifier;
use revenue_copilot::knowledge::KnowledgeAgent;
use revenue_copilot::knowledge::chunker::Chunker;
use revenue_copilot::llm::{
    LlmBackend, LlmConfig, create_embedder, create_resilient_provider,
};
use revenue_copilot::router::Router;
use revenue_copilot::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CopilotConfig::from_env()?;

    // Initialize tracing, optionally with a rolling file appender.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "copilot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    // API keys: the completion backend follows which key is set, preferring
    // Anthropic when both are. Embeddings always need an OpenAI key.
    let anthropic_key = std::env::var("ANTHROPIC_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();

    let (backend, completion_key) = match (&anthropic_key, &openai_key) {
        (Some(key), _) => (LlmBackend::Anthropic, key.clone()),
        (None, Some(key)) => (LlmBackend::OpenAi, key.clone()),
        (None, None) => {
            anyhow::bail!("Set ANTHROPIC_API_KEY or OPENAI_API_KEY");
        }
    };
    let Some(openai_key) = openai_key else {
        anyhow::bail!("OPENAI_API_KEY is required for embeddings");
    };

    eprintln!("📈 Revenue Copilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Embeddings: {}", config.embedding_model);
    eprintln!("   Listening: http://{}", config.bind_addr);
    eprintln!("   Database: {}", config.db_path);

    let llm_config = LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(completion_key),
        model: config.model.clone(),
    };
    let llm = create_resilient_provider(&llm_config)?;
    let embedder = create_embedder(
        &secrecy::SecretString::from(openai_key),
        &config.embedding_model,
    )?;

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path)).await?,
    );

    let knowledge = Arc::new(KnowledgeAgent::new(
        llm.clone(),
        embedder,
        db.clone(),
        Chunker::new(config.chunk_size, config.chunk_overlap),
        config.retrieval_top_k,
        config.low_confidence_threshold,
    ));
    let dealflow = Arc::new(DealflowAgent::new(llm.clone(), db.clone()));
    let orchestrator = Arc::new(Router::new(
        IntentClassifier::new(llm.clone()),
        knowledge.clone(),
        dealflow.clone(),
        db.clone(),
    ));

    let state = AppState {
        classifier: Arc::new(IntentClassifier::new(llm)),
        knowledge,
        dealflow,
        orchestrator,
        db,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
