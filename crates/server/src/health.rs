use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use hiredrill_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    scout_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ready,
    Degraded,
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: ProbeStatus,
    pub detail: String,
}

impl Probe {
    fn new(status: ProbeStatus, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: ProbeStatus,
    pub service: &'static str,
    pub database: Probe,
    pub scout: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, scout_enabled: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, scout_enabled })
}

/// Readiness follows the database alone; a disabled scout is reported but does not degrade.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = probe_database(&state.db_pool).await;
    let scout = if state.scout_enabled {
        Probe::new(ProbeStatus::Ready, "github token configured")
    } else {
        Probe::new(ProbeStatus::Disabled, "set HIREDRILL_SCOUT_GITHUB_TOKEN to enable")
    };

    let status = database.status;
    if status != ProbeStatus::Ready {
        tracing::warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            detail = %database.detail,
            "health probe degraded"
        );
    }

    let code = match status {
        ProbeStatus::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let payload = HealthResponse {
        status,
        service: "hiredrill-server",
        database,
        scout,
        checked_at: Utc::now().to_rfc3339(),
    };
    (code, Json(payload))
}

/// Reports how many migrations are applied; a missing migrations table means an unmigrated schema.
async fn probe_database(pool: &DbPool) -> Probe {
    let applied = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match applied {
        Ok(0) => Probe::new(ProbeStatus::Degraded, "no migrations applied"),
        Ok(count) => Probe::new(ProbeStatus::Ready, format!("{count} migration(s) applied")),
        Err(error) => Probe::new(ProbeStatus::Degraded, format!("database probe failed: {error}")),
    }
}
