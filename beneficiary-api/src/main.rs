//! Beneficiary Resolver API Server
//!
//! HTTP API server that resolves the ultimate owner of consumer brands.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use beneficiary_research::{
    ExaClient, HttpPageFetcher, LegacyScrapeProvider, LlmClient, OpenAIClient, RateLimiter,
    ReasoningProvider, SearchClient, WebSearchProvider,
};
use beneficiary_services::{
    InMemoryKnowledgeStore, JsonStaticMappings, KnowledgeStore, PipelineConfig,
    ResearchProviderChain, ResolutionPipeline, SqliteKnowledgeStore, StaticDomainRegistry,
    TracingMetricsSink,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResolutionPipeline>,
    pub metrics: Arc<TracingMetricsSink>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,beneficiary_api=debug")),
        )
        .init();

    info!("Starting Beneficiary Resolver API");

    let config = PipelineConfig::from_env();
    let metrics = Arc::new(TracingMetricsSink::new());
    let pipeline = build_pipeline(config)?.with_metrics(metrics.clone());

    let providers = pipeline.provider_names();
    if providers.is_empty() {
        warn!("No research providers configured - set OPENAI_API_KEY to enable research");
    } else {
        info!("Research providers: {}", providers.join(" -> "));
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        metrics,
    };

    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Build router
    let app = Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // Start server
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire stores and providers from the environment
///
/// Every upstream is optional: without OPENAI_API_KEY only the cache, static
/// mappings and knowledge base can answer.
fn build_pipeline(config: PipelineConfig) -> anyhow::Result<ResolutionPipeline> {
    let knowledge: Arc<dyn KnowledgeStore> = match &config.knowledge_db_path {
        Some(path) => Arc::new(SqliteKnowledgeStore::open(path, config.cache_ttl)?),
        None => {
            info!("KNOWLEDGE_DB_PATH not set, using in-memory knowledge store");
            Arc::new(InMemoryKnowledgeStore::with_ttl(config.cache_ttl))
        }
    };

    let static_mappings = match &config.static_mappings_path {
        Some(path) => JsonStaticMappings::from_file(path)?,
        None => JsonStaticMappings::new(),
    };

    let registry = match &config.source_domains_path {
        Some(path) => StaticDomainRegistry::from_file(path)?,
        None => StaticDomainRegistry::builtin(),
    };

    let llm: Option<Arc<dyn LlmClient>> = match OpenAIClient::new() {
        Ok(client) => {
            let client = match std::env::var("OPENAI_MODEL") {
                Ok(model) if !model.trim().is_empty() => client.with_model(model.trim()),
                _ => client,
            };
            info!("OpenAI client initialized (model {})", client.model());
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("LLM research disabled: {}", e);
            None
        }
    };

    let search: Option<Arc<dyn SearchClient>> = match ExaClient::new() {
        Ok(client) => Some(Arc::new(client.with_rate_limiter(RateLimiter::for_search()))),
        Err(e) => {
            info!("Web search disabled: {}", e);
            None
        }
    };

    let policy = config.provider_policy.clone();
    let mut chain = ResearchProviderChain::new();
    let mut direct = None;

    // Sourced research first; model knowledge alone was already tried by the
    // direct reasoner, so it only backs up the chain
    if let Some(llm) = &llm {
        direct = Some(Arc::new(
            ReasoningProvider::new(Arc::clone(llm)).named("direct_reasoning"),
        ));

        if let Some(search) = &search {
            chain = chain.with_provider(
                Arc::new(WebSearchProvider::new(Arc::clone(search), Arc::clone(llm))),
                policy.clone(),
            );
        }

        let mut scraper =
            LegacyScrapeProvider::new(Arc::new(HttpPageFetcher::new()?), Arc::clone(llm));
        if let Some(search) = &search {
            scraper = scraper.with_search(Arc::clone(search));
        }
        chain = chain
            .with_provider(Arc::new(scraper), policy.clone())
            .with_provider(Arc::new(ReasoningProvider::new(Arc::clone(llm))), policy.clone());
    }

    let mut pipeline = ResolutionPipeline::new(
        knowledge,
        Arc::new(static_mappings),
        Arc::new(registry),
        chain,
    );
    if let Some(direct) = direct {
        pipeline = pipeline.with_direct_reasoner(direct, policy);
    }
    Ok(pipeline.with_config(config))
}
