use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use hiredrill_agent::drill::{generate_for_session, session_drill_stream, DRILL_MESSAGES};
use hiredrill_agent::evaluation::{evaluate_solution, EvaluationOutcome};
use hiredrill_agent::guardrails::Direction;
use hiredrill_agent::pipeline::{Emitter, PipelineError};
use hiredrill_agent::research::research_stream;
use hiredrill_core::domain::company::CompanySummary;
use hiredrill_core::domain::drill::{Drill, DrillType};
use hiredrill_core::domain::session::{
    Role, SessionRecord, UserSelection, UserSelectionRequest, PREDEFINED_ROLES,
};
use hiredrill_core::errors::ApplicationError;
use hiredrill_core::events::StreamEvent;
use hiredrill_db::SessionStore;

use crate::error::ApiError;
use crate::sse;
use crate::state::AppState;

pub const SESSION_NOT_FOUND: &str = "Session not found";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: &'static [Role],
}

#[derive(Debug, Serialize)]
pub struct GenerationMetadata {
    pub generators_used: Vec<DrillType>,
}

#[derive(Debug, Serialize)]
pub struct DrillGenerationData {
    pub session_id: String,
    pub company_name: String,
    pub role: String,
    pub drill: Drill,
    pub generation_metadata: GenerationMetadata,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    pub solution: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/roles", get(list_roles))
        .route("/api/user-selection", post(create_selection))
        .route("/api/company-research/{session_id}/stream", get(research_events))
        .route("/api/generate-drill/{session_id}/stream", get(drill_events))
        .route("/api/generate-drill/{session_id}", post(generate_drill))
        .route("/api/evaluate-solution/{session_id}", post(evaluate))
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

async fn list_roles() -> Json<RolesResponse> {
    Json(RolesResponse { roles: PREDEFINED_ROLES })
}

async fn create_selection(
    State(state): State<AppState>,
    Json(request): Json<UserSelectionRequest>,
) -> Result<Json<ApiResponse<UserSelection>>, ApiError> {
    let selection = request.validate()?;
    let record = SessionRecord::from_selection(&selection);
    state.sessions.put(record).await.map_err(|error| {
        ApiError::from_application(
            ApplicationError::Persistence(error.to_string()),
            &selection.session_id,
        )
    })?;

    tracing::info!(
        event_name = "session.created",
        correlation_id = %selection.session_id,
        role = %selection.role,
        "practice session created"
    );
    Ok(ApiResponse::ok(selection))
}

async fn load_session(
    sessions: &dyn SessionStore,
    session_id: &str,
) -> Result<Option<SessionRecord>, ApiError> {
    sessions.get(session_id).await.map_err(|error| {
        ApiError::from_application(ApplicationError::Persistence(error.to_string()), session_id)
    })
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

async fn research_events(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let session = match load_session(state.sessions.as_ref(), &session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return sse::single_error(SESSION_NOT_FOUND),
        Err(error) => return sse::single_error(error.message()),
    };

    let sessions = state.sessions.clone();
    let events = research_stream(
        state.runtime.clone(),
        session.company_name,
        session.role,
        session_id.clone(),
    )
    .then(move |event| {
        let sessions = sessions.clone();
        let session_id = session_id.clone();
        async move {
            if let StreamEvent::Complete { data } = &event {
                remember_summary(sessions.as_ref(), &session_id, data).await;
            }
            event
        }
    });
    sse::event_response(events)
}

async fn remember_summary(sessions: &dyn SessionStore, session_id: &str, summary: &CompanySummary) {
    let stored = match sessions.get(session_id).await {
        Ok(Some(mut record)) => {
            record.research_summary = Some(summary.clone());
            sessions.put(record).await.map_err(|error| error.to_string())
        }
        Ok(None) => Err("session expired during research".to_string()),
        Err(error) => Err(error.to_string()),
    };
    if let Err(error) = stored {
        tracing::warn!(
            event_name = "session.store.failed",
            correlation_id = %session_id,
            error = %error,
            "could not store research summary"
        );
    }
}

async fn drill_events(Path(session_id): Path<String>, State(state): State<AppState>) -> Response {
    match load_session(state.sessions.as_ref(), &session_id).await {
        Ok(Some(session)) => sse::event_response(session_drill_stream(
            state.runtime.clone(),
            state.sessions.clone(),
            session,
            session_id,
        )),
        Ok(None) => sse::single_error(SESSION_NOT_FOUND),
        Err(error) => sse::single_error(error.message()),
    }
}

// ---------------------------------------------------------------------------
// Request/response endpoints
// ---------------------------------------------------------------------------

async fn generate_drill(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DrillGenerationData>>, ApiError> {
    let session = load_session(state.sessions.as_ref(), &session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(SESSION_NOT_FOUND))?;
    let company_name = session.company_name.clone();
    let role = session.role.clone();

    let outcome = generate_for_session(
        &state.runtime,
        state.sessions.as_ref(),
        session,
        &session_id,
        &Emitter::<()>::detached(),
    )
    .await
    .map_err(|error| drill_error(&error, &session_id))?;

    Ok(ApiResponse::ok(DrillGenerationData {
        session_id,
        company_name,
        role,
        drill: outcome.drill,
        generation_metadata: GenerationMetadata { generators_used: outcome.generators_used },
    }))
}

fn drill_error(error: &PipelineError, session_id: &str) -> ApiError {
    tracing::warn!(
        event_name = "api.drill.failed",
        correlation_id = %session_id,
        error = %error,
        "drill generation failed"
    );
    let status = match error.tripwire() {
        Some(Direction::Input) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError::new(status, "drill_generation_failed", error.user_message(DRILL_MESSAGES))
}

async fn evaluate(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<EvaluationRequest>,
) -> Result<Json<ApiResponse<EvaluationOutcome>>, ApiError> {
    let outcome = evaluate_solution(
        &state.runtime,
        state.sessions.as_ref(),
        state.feedback.as_ref(),
        &session_id,
        &request.solution,
    )
    .await?;
    Ok(ApiResponse::ok(outcome))
}
