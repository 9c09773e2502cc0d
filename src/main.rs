//! chatgraph - tool-using chat assistant
//!
//! A web chat backed by Gemini with a small tool set. Every conversation is a
//! thread whose progress is checkpointed to SQLite after each graph step.

mod api;
mod config;
mod db;
mod graph;
mod llm;
mod runtime;
mod session;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use llm::{GeminiService, LlmService, LoggingService};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatgraph=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let api_key = config.google_api_key.clone().unwrap_or_else(|| {
        tracing::warn!("No Gemini API key configured. Set GOOGLE_API_KEY; chat requests will fail.");
        String::new()
    });
    let gemini = GeminiService::new(
        api_key,
        &config.gemini_model,
        config.gemini_base_url.as_deref(),
    )?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(gemini)));
    tracing::info!(
        model = %llm.model_id(),
        max_tool_rounds = config.max_tool_rounds,
        "LLM client initialized"
    );

    if config.tools.uses_demo_stock_key() {
        tracing::warn!(
            "No Alpha Vantage key configured. Set ALPHAVANTAGE_API_KEY; stock quotes only cover IBM."
        );
    }

    let state = AppState::new(db, llm, config.tools.clone(), config.max_tool_rounds);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chatgraph server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last database handle, is gone by now
    tracing::info!("Server stopped, database closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
