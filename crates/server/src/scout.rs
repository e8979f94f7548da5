use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;

use hiredrill_core::domain::scout::{
    DeveloperProfile, RunTotals, ScoutRun, ScoutRunStatus, ScoutSearchResult, SearchFilters,
    StoredProfile,
};
use hiredrill_core::errors::ApplicationError;
use hiredrill_db::RepositoryError;

use crate::error::ApiError;
use crate::sse;
use crate::state::{ActiveSearch, AppState};

pub const NO_PROFILE: &str = "No developer profile found";
pub const PROFILE_REQUIRED: &str = "Save a developer profile before searching";
pub const RUN_NOT_FOUND: &str = "Search run not found";
pub const RUN_IN_PROGRESS: &str = "Search already in progress";
pub const SCOUT_UNAVAILABLE: &str = "Repository scout is not configured. Set a GitHub token.";

#[derive(Debug, Serialize)]
pub struct ProfileIdResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct SearchRunResponse {
    pub run_id: String,
    pub status: ScoutRunStatus,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: ScoutRunStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/scout/profile", get(get_profile).put(save_profile))
        .route("/api/scout/search", post(start_search))
        .route("/api/scout/search/{run_id}/stream", get(search_events))
        .route("/api/scout/search/{run_id}/results", get(search_results))
        .route("/api/scout/search/{run_id}/cancel", post(cancel_search))
}

fn persistence(error: RepositoryError, correlation_id: &str) -> ApiError {
    ApiError::from_application(ApplicationError::Persistence(error.to_string()), correlation_id)
}

async fn get_profile(State(state): State<AppState>) -> Result<Json<StoredProfile>, ApiError> {
    state
        .scout_repository
        .get_profile()
        .await
        .map_err(|error| persistence(error, "scout.profile"))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(NO_PROFILE))
}

async fn save_profile(
    State(state): State<AppState>,
    Json(profile): Json<DeveloperProfile>,
) -> Result<Json<ProfileIdResponse>, ApiError> {
    profile.validate()?;
    let stored = state
        .scout_repository
        .save_profile(profile)
        .await
        .map_err(|error| persistence(error, "scout.profile"))?;
    Ok(Json(ProfileIdResponse { id: stored.id }))
}

async fn start_search(
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Json(filters): Json<SearchFilters>,
) -> Result<(StatusCode, Json<SearchRunResponse>), ApiError> {
    if state.scout.is_none() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "scout_unavailable",
            SCOUT_UNAVAILABLE,
        ));
    }
    filters.validate()?;
    state.searches.check(client.ip()).map_err(ApiError::too_many_requests)?;

    let repository = &state.scout_repository;
    let profile =
        repository.get_profile().await.map_err(|error| persistence(error, "scout.search"))?;
    if profile.is_none() {
        return Err(ApiError::bad_request("profile_required", PROFILE_REQUIRED));
    }

    let run =
        repository.create_run(&filters).await.map_err(|error| persistence(error, "scout.search"))?;
    state.searches.record(client.ip());
    tracing::info!(
        event_name = "scout.search.created",
        correlation_id = %run.id,
        client = %client.ip(),
        "scout search run created"
    );
    Ok((StatusCode::CREATED, Json(SearchRunResponse { run_id: run.id, status: run.status })))
}

async fn search_events(Path(run_id): Path<String>, State(state): State<AppState>) -> Response {
    let Some(scout) = state.scout.clone() else {
        return sse::single_error(SCOUT_UNAVAILABLE);
    };
    let run = match state.scout_repository.get_run(&run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => return sse::single_error(RUN_NOT_FOUND),
        Err(error) => return sse::single_error(persistence(error, &run_id).message()),
    };
    let Some(active) = ActiveSearch::begin(state.searches.clone(), &run_id) else {
        return sse::single_error(RUN_IN_PROGRESS);
    };

    let events = scout.search_stream(run_id, run.filters).map(move |event| {
        let _held = &active;
        event
    });
    sse::event_response(events)
}

async fn search_results(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ScoutSearchResult>, ApiError> {
    state
        .scout_repository
        .get_search_results(&run_id)
        .await
        .map_err(|error| persistence(error, &run_id))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(RUN_NOT_FOUND))
}

async fn cancel_search(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CancelResponse>, ApiError> {
    let run: ScoutRun = state
        .scout_repository
        .get_run(&run_id)
        .await
        .map_err(|error| persistence(error, &run_id))?
        .ok_or_else(|| ApiError::not_found(RUN_NOT_FOUND))?;

    let cancelled = state.runtime.registry().cancel_all(&run_id);
    state.searches.end(&run_id);
    let totals = RunTotals {
        discovered: run.total_discovered,
        filtered: run.total_filtered,
        analyzed: run.total_analyzed,
    };
    state
        .scout_repository
        .update_run(&run_id, ScoutRunStatus::Cancelled, totals)
        .await
        .map_err(|error| persistence(error, &run_id))?;

    tracing::info!(
        event_name = "scout.search.cancel_requested",
        correlation_id = %run_id,
        cancelled_handles = cancelled,
        "scout search cancelled"
    );
    Ok(Json(CancelResponse { status: ScoutRunStatus::Cancelled }))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::Response};
    use serde_json::json;

    use hiredrill_agent::prompts::REPO_ANALYST;
    use hiredrill_agent::scripted::{Reply, ScriptedLlm};
    use hiredrill_core::domain::scout::{ScoutRunStatus, SearchFilters};
    use hiredrill_db::ScoutRepository;

    use crate::sse::tests::frames;
    use crate::testing::{json_body, repo, send, StaticSource, TestApp};

    fn scout_app(searches_per_hour: u32) -> TestApp {
        let llm = ScriptedLlm::new().with_clean_classifiers().reply(
            REPO_ANALYST,
            Reply::Output(json!({
                "results": [
                    { "repo": "octo/ledger", "fit_score": 8.0, "reason": "matches Rust goals",
                      "contributions": ["docs"] },
                    { "repo": "octo/queue", "fit_score": 3.0, "reason": "stale", "reject": true }
                ]
            })),
        );
        TestApp::with_scout(
            llm,
            StaticSource::new(vec![repo(1, "ledger"), repo(2, "queue")]),
            searches_per_hour,
        )
    }

    async fn save_profile(app: &TestApp) {
        let response = send(
            app.router(),
            "PUT",
            "/api/scout/profile",
            Some(json!({ "languages": ["Rust"], "skill_level": "advanced", "goals": "storage" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn start(app: &TestApp) -> Response {
        send(app.router(), "POST", "/api/scout/search", Some(json!({ "languages": ["Rust"] }))).await
    }

    #[tokio::test]
    async fn profile_is_missing_until_saved() {
        let app = scout_app(5);
        let response = send(app.router(), "GET", "/api/scout/profile", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["message"], "No developer profile found");

        let invalid =
            send(app.router(), "PUT", "/api/scout/profile", Some(json!({ "languages": [] }))).await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        save_profile(&app).await;
        let body = json_body(send(app.router(), "GET", "/api/scout/profile", None).await).await;
        assert_eq!(body["id"], "default");
        assert_eq!(body["profile"]["skill_level"], "advanced");
    }

    #[tokio::test]
    async fn search_requires_a_profile_and_respects_the_rate_limit() {
        let app = scout_app(1);
        let response = start(&app).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "profile_required");

        save_profile(&app).await;
        let response = start(&app).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["status"], "running");

        let response = start(&app).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await["error"]["message"],
            "Rate limit exceeded. Maximum 1 searches per hour."
        );
    }

    #[tokio::test]
    async fn streamed_search_persists_visible_results() {
        let app = scout_app(5);
        save_profile(&app).await;
        let run_id =
            json_body(start(&app).await).await["run_id"].as_str().expect("run id").to_string();

        let events =
            frames(send(app.router(), "GET", &format!("/api/scout/search/{run_id}/stream"), None).await)
                .await;
        let last = events.last().expect("terminal event");
        assert_eq!(last["type"], "complete");
        assert_eq!(last["data"]["results"][0]["repo"], "octo/ledger");
        assert!(!app.state.searches.is_active(&run_id));

        let body = json_body(
            send(app.router(), "GET", &format!("/api/scout/search/{run_id}/results"), None).await,
        )
        .await;
        assert_eq!(body["total_discovered"], 2);
        assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_runs_are_reported() {
        let app = scout_app(5);
        let events =
            frames(send(app.router(), "GET", "/api/scout/search/missing/stream", None).await).await;
        assert_eq!(events, vec![json!({ "type": "error", "message": "Search run not found" })]);

        let response = send(app.router(), "GET", "/api/scout/search/missing/results", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(app.router(), "POST", "/api/scout/search/missing/cancel", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn busy_runs_reject_a_second_stream() {
        let app = scout_app(5);
        let run = app.scout_repository.create_run(&SearchFilters::default()).await.expect("run");
        assert!(app.state.searches.begin(&run.id));

        let uri = format!("/api/scout/search/{}/stream", run.id);
        let events = frames(send(app.router(), "GET", &uri, None).await).await;
        assert_eq!(events, vec![json!({ "type": "error", "message": "Search already in progress" })]);
    }

    #[tokio::test]
    async fn cancel_marks_the_run_and_releases_the_slot() {
        let app = scout_app(5);
        let run = app.scout_repository.create_run(&SearchFilters::default()).await.expect("run");
        assert!(app.state.searches.begin(&run.id));

        let response =
            send(app.router(), "POST", &format!("/api/scout/search/{}/cancel", run.id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "cancelled" }));

        assert!(app.state.runtime.registry().is_cancelled(&run.id));
        assert!(!app.state.searches.is_active(&run.id));
        let stored = app.scout_repository.get_run(&run.id).await.expect("read").expect("run");
        assert_eq!(stored.status, ScoutRunStatus::Cancelled);
    }

    #[tokio::test]
    async fn search_without_github_is_unavailable() {
        let app = TestApp::new(ScriptedLlm::new());
        let response = start(&app).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
