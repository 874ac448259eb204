//! REST API route handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};

use ailab_agent::{ChatTurn, ModelEntry, generate_title};
use ailab_store::{AgentDraft, AgentProfile, SessionSummary, StoredMessage};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const AGENT_NOT_FOUND: &str = "Agent not found";
const SESSION_NOT_FOUND: &str = "Session not found";

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// GET /api/models
pub async fn models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelEntry>> {
    Json(state.chat.registry().models())
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// GET /api/agents
pub async fn list_agents(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AgentProfile>>> {
    Ok(Json(state.chat.agents().list().await?))
}

/// POST /api/agents: create or update.
pub async fn save_agent(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<AgentDraft>,
) -> ApiResult<Json<AgentProfile>> {
    let profile = state.chat.agents().save(draft).await?;
    info!(agent_id = %profile.id, "agent saved");
    Ok(Json(profile))
}

/// DELETE /api/agents/{id}
pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .chat
        .agents()
        .delete(&id)
        .await
        .map_err(|e| ApiError::from_store(e, AGENT_NOT_FOUND))?;
    Ok(success())
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// GET /api/sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.chat.sessions().list().await?))
}

/// GET /api/sessions/{id}: message history, empty for unknown sessions.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<StoredMessage>>> {
    Ok(Json(state.chat.sessions().messages(&id).await?))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .chat
        .sessions()
        .delete(&id)
        .await
        .map_err(|e| ApiError::from_store(e, SESSION_NOT_FOUND))?;
    Ok(success())
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.chat.sessions().search(&params.q).await?))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One line of the chat stream: `0:` carries a text fragment, `3:` an
/// error, both followed by a JSON string.
pub fn stream_line(code: u8, text: &str) -> String {
    let encoded = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".into());
    format!("{code}:{encoded}\n")
}

/// POST /api/chat: stream the assistant reply as it is generated.
///
/// Problems found before the first byte (bad session id, unknown model)
/// are ordinary JSON errors.  Failures after streaming started are sent as
/// a `3:` line and end the stream.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(turn): Json<ChatTurn>,
) -> ApiResult<Response> {
    if turn.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("sessionId is required".into()));
    }
    state.chat.sessions().load(&turn.session_id).await?;
    state.chat.resolve_model(turn.model_id.as_deref()).await?;

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let service = state.chat.clone();
    tokio::spawn(async move {
        let session_id = turn.session_id.clone();
        let text_tx = tx.clone();
        let mut on_text = move |fragment: &str| {
            if !fragment.is_empty() {
                let _ = text_tx.send(stream_line(0, fragment));
            }
        };
        match service.send(turn, &mut on_text).await {
            Ok(outcome) => {
                info!(session_id = %outcome.session_id, chars = outcome.reply.len(), "chat stream finished");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "chat stream failed");
                let _ = tx.send(stream_line(3, &e.to_string()));
            }
        }
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (Ok::<_, Infallible>(line), rx))
    });
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRequest {
    pub message: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// POST /api/generate-title
pub async fn title(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TitleRequest>,
) -> ApiResult<Json<Value>> {
    let model = state.chat.resolve_model(body.model_id.as_deref()).await?;
    let title = generate_title(model.as_ref(), &body.message).await?;
    Ok(Json(json!({ "title": title })))
}
