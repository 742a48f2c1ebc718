//! Swap session endpoints.
//!
//! This module provides handlers for submitting, polling, stopping and
//! abandoning swap sessions.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use indexswap_auth::TokenValidator;
use indexswap_core::{CoreError, SessionId};
use indexswap_engine::{EngineError, SessionManager, SubmitSwapRequest};
use indexswap_store::{ModuleSwapTarget, SessionStatus, SwapSession};

use crate::auth::OwnerContext;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitSwapResponse {
    /// Always `true`.
    pub success: bool,
    /// Id to poll with.
    pub session_id: String,
    /// Human-readable result.
    pub message: String,
}

/// Progress of one module.
#[derive(Debug, Serialize)]
pub struct TargetDetail {
    /// The index currently held.
    pub old_index: String,
    /// Candidate indexes, comma-separated.
    pub new_indexes: String,
    /// Whether the swap went through.
    pub swapped: bool,
    /// Latest outcome for this module.
    pub message: String,
}

impl From<ModuleSwapTarget> for TargetDetail {
    fn from(target: ModuleSwapTarget) -> Self {
        Self {
            new_indexes: target.candidates_display(),
            old_index: target.old_index,
            swapped: target.swapped,
            message: target.message,
        }
    }
}

/// Response for a status poll.
#[derive(Debug, Serialize)]
pub struct SwapStatusResponse {
    /// Session status.
    pub status: SessionStatus,
    /// Session-level message.
    pub message: String,
    /// Per-module progress, in submission order.
    pub details: Vec<TargetDetail>,
}

impl From<SwapSession> for SwapStatusResponse {
    fn from(session: SwapSession) -> Self {
        Self {
            status: session.status,
            message: session.message,
            details: session.targets.into_iter().map(Into::into).collect(),
        }
    }
}

/// Summary of one session in a listing.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    /// Session ID.
    pub session_id: String,
    /// Session status.
    pub status: SessionStatus,
    /// Session-level message.
    pub message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Hard deadline.
    pub deadline_at: DateTime<Utc>,
}

impl From<SwapSession> for SessionSummary {
    fn from(session: SwapSession) -> Self {
        Self {
            session_id: session.session_id.to_string(),
            status: session.status,
            message: session.message,
            created_at: session.created_at,
            deadline_at: session.deadline_at,
        }
    }
}

/// Response for the session listing.
#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    /// The caller's sessions, newest first.
    pub sessions: Vec<SessionSummary>,
}

/// Acknowledgement for stop and logout.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    /// Always `true`.
    pub success: bool,
    /// Human-readable result.
    pub message: String,
}

impl AckResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse::<SessionId>()
        .map_err(|e| ApiError::from(CoreError::from(e)))
}

// =============================================================================
// Handlers
// =============================================================================

/// Submit a swap request and start its session.
///
/// # Example
///
/// ```text
/// POST /api/submit-swap
/// Authorization: Bearer <token>
///
/// {"num_modules": 1, "modules": [{"old_index": "80271", "new_indexes": "80275, 80276"}]}
///
/// Response: 200 OK
/// {"success": true, "session_id": "...", "message": "Swap process started successfully"}
/// ```
pub async fn submit_swap<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    ctx: OwnerContext,
    Json(body): Json<SubmitSwapRequest>,
) -> Result<Json<SubmitSwapResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let targets = body.into_targets()?;
    let session_id = state.manager.create_session(&ctx.owner, targets).await?;

    Ok(Json(SubmitSwapResponse {
        success: true,
        session_id: session_id.to_string(),
        message: "Swap process started successfully".to_string(),
    }))
}

/// Poll a session's progress.
///
/// A session that no longer exists answers `401` so the client drops back
/// to the login screen.
pub async fn swap_status<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    ctx: OwnerContext,
    Path(session_id): Path<String>,
) -> Result<Json<SwapStatusResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let session_id = parse_session_id(&session_id)?;

    match state.manager.get_status(&ctx.owner, &session_id).await {
        Ok(session) => Ok(Json(session.into())),
        Err(EngineError::SessionNotFound(_)) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

/// List the caller's sessions.
pub async fn list_swaps<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    ctx: OwnerContext,
) -> Result<Json<ListSessionsResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let sessions = state.manager.list_sessions(&ctx.owner).await?;

    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// Stop a running session.
pub async fn stop_swap<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    ctx: OwnerContext,
    Path(session_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.manager.stop(&ctx.owner, &session_id).await?;

    Ok(AckResponse::ok("Swap successfully stopped"))
}

/// Stop a session if needed and discard it.
pub async fn logout<M, V>(
    State(state): State<Arc<AppState<M, V>>>,
    ctx: OwnerContext,
    Path(session_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.manager.logout(&ctx.owner, &session_id).await?;

    Ok(AckResponse::ok("Successfully logged out."))
}
