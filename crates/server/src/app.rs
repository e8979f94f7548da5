use axum::{
    http::{HeaderValue, Method},
    Router,
};
use hiredrill_core::config::ServerConfig;
use hiredrill_db::DbPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::AppState;
use crate::{health, interview, scout};

/// Interview and scout routes bound to `state`.
pub fn api_routes(state: AppState) -> Router {
    Router::new().merge(interview::router()).merge(scout::router()).with_state(state)
}

pub fn build(state: AppState, db_pool: DbPool, server: &ServerConfig) -> Router {
    let scout_enabled = state.scout.is_some();
    api_routes(state).merge(health::router(db_pool, scout_enabled)).layer(cors(&server.cors_origins))
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(
                    event_name = "system.cors.invalid_origin",
                    origin = %origin,
                    "ignoring unparseable cors origin"
                );
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use hiredrill_agent::scripted::ScriptedLlm;
    use hiredrill_core::config::{AppConfig, ServerConfig};
    use hiredrill_db::{connect_with_settings, migrations};

    use super::build;
    use crate::testing::TestApp;

    #[tokio::test]
    async fn health_and_cors_are_mounted_alongside_the_api() {
        let app = TestApp::new(ScriptedLlm::new());
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let server = ServerConfig {
            cors_origins: vec!["http://localhost:5173".to_string()],
            ..AppConfig::default().server
        };
        let router = build(app.state.clone(), pool, &server);

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::get("/api/roles")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.headers()["access-control-allow-origin"], "http://localhost:5173");
    }
}
