//! HTTP request handlers

use super::assets::{serve_asset, serve_index};
use super::sse::turn_stream;
use super::types::{
    ChatRequest, ErrorResponse, HistoryResponse, ThreadListResponse, ThreadStateResponse,
};
use super::AppState;
use crate::db::{CheckpointSummary, DbError};
use crate::runtime::{RuntimeError, TurnEvent};
use crate::session::{SessionError, SessionView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::mpsc;

const FORWARD_BUFFER: usize = 64;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/assets/*path", get(serve_asset))
        // Browser sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:sid", get(get_session))
        .route("/api/sessions/:sid/threads/new", post(new_thread))
        .route(
            "/api/sessions/:sid/threads/:tid/select",
            post(select_thread),
        )
        .route(
            "/api/sessions/:sid/threads/:tid/delete",
            post(delete_thread),
        )
        .route("/api/sessions/:sid/chat", post(send_chat))
        // Threads
        .route("/api/threads", get(list_threads))
        .route("/api/threads/:tid", get(get_thread))
        .route("/api/threads/:tid/history", get(get_history))
        .route("/api/threads/:tid/resume", post(resume_thread))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.sessions.create())
}

async fn get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.view(&sid)?))
}

async fn new_thread(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.new_thread(&sid)?))
}

async fn select_thread(
    State(state): State<AppState>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.select_thread(&sid, &tid)?))
}

/// Deleting a thread with a running turn is rejected; the turn would write
/// the thread back on its next checkpoint.
async fn delete_thread(
    State(state): State<AppState>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<Json<SessionView>, AppError> {
    let _guard = state.runtime.reserve(&tid)?;
    Ok(Json(state.sessions.delete_thread(&sid, &tid)?))
}

/// Submit a message on the session's active thread.
///
/// The session is updated by a forwarding task, so it sees the outcome even
/// if the client goes away mid-stream.
async fn send_chat(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    let thread_id = state.sessions.view(&sid)?.thread_id;
    let mut turn = state.runtime.submit(&thread_id, text.clone())?;
    state.sessions.begin_submission(&sid, &text)?;
    tracing::info!(session_id = %sid, thread_id = %thread_id, "Message submitted");

    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        while let Some(event) = turn.recv().await {
            match &event {
                TurnEvent::Done { message } => {
                    sessions.finish_submission(&sid, &thread_id, Some(message.as_str()));
                }
                TurnEvent::Error { .. } => sessions.finish_submission(&sid, &thread_id, None),
                _ => {}
            }
            // A closed receiver only means the client left; keep draining
            let _ = tx.send(event).await;
        }
    });

    Ok(turn_stream(rx).into_response())
}

// ============================================================
// Threads
// ============================================================

async fn list_threads(State(state): State<AppState>) -> Result<Json<ThreadListResponse>, AppError> {
    Ok(Json(ThreadListResponse {
        threads: state.db.list_threads()?,
    }))
}

async fn get_thread(
    State(state): State<AppState>,
    Path(tid): Path<String>,
) -> Result<Json<ThreadStateResponse>, AppError> {
    let latest = state.db.latest_checkpoint(&tid)?;
    let response = match latest {
        Some(cp) => ThreadStateResponse {
            interrupted: cp.is_interrupted(),
            step: Some(cp.step),
            next: cp.next,
            messages: cp.state.messages,
            thread_id: tid,
        },
        None => ThreadStateResponse {
            thread_id: tid,
            step: None,
            next: None,
            interrupted: false,
            messages: Vec::new(),
        },
    };
    Ok(Json(response))
}

async fn get_history(
    State(state): State<AppState>,
    Path(tid): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let checkpoints = state
        .db
        .list_checkpoints(&tid)?
        .iter()
        .map(CheckpointSummary::from)
        .collect();
    Ok(Json(HistoryResponse {
        thread_id: tid,
        checkpoints,
    }))
}

/// Continue an interrupted turn; sessions showing the thread are reloaded
/// when it ends.
async fn resume_thread(
    State(state): State<AppState>,
    Path(tid): Path<String>,
) -> Result<Response, AppError> {
    let mut turn = state.runtime.resume(&tid)?;
    tracing::info!(thread_id = %tid, "Resume requested");

    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        while let Some(event) = turn.recv().await {
            if matches!(event, TurnEvent::Done { .. } | TurnEvent::Error { .. }) {
                sessions.refresh_thread(&tid);
            }
            let _ = tx.send(event).await;
        }
    });

    Ok(turn_stream(rx).into_response())
}

async fn get_version() -> &'static str {
    concat!("chatgraph ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Storage(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Busy(_) => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
