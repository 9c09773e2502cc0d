//! HTTP API for the chat UI
//!
//! Session routes drive the browser view; thread routes expose the
//! checkpoint store directly.

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::llm::LlmService;
use crate::runtime::{
    ChatRuntime, DatabaseStore, ProductionRuntime, ToolRegistryExecutor, TurnExecutor,
};
use crate::session::SessionManager;
use crate::tools::{ToolRegistry, ToolsConfig};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub runtime: ProductionRuntime,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmService>,
        tools: ToolsConfig,
        max_tool_rounds: u32,
    ) -> Self {
        let executor = TurnExecutor::new(
            DatabaseStore::new(db.clone()),
            llm,
            ToolRegistryExecutor::new(ToolRegistry::standard(), reqwest::Client::new(), tools),
            max_tool_rounds,
        );

        Self {
            runtime: ChatRuntime::new(executor),
            sessions: Arc::new(SessionManager::new(Arc::new(db.clone()))),
            db,
        }
    }
}
