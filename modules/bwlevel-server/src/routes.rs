use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bwlevel_core::{PlayerName, Resolution, ResolutionView, Resolver};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

const NOT_FOUND_YET: &str = "Level not found yet, try again";

#[derive(Clone)]
pub struct AppState {
    resolver: Resolver,
    /// Longest a request waits on a render before answering `unknown`.
    deadline: Duration,
}

#[derive(Debug, Serialize)]
pub struct PlayerLevelResponse {
    #[serde(flatten)]
    pub view: ResolutionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<Resolution> for PlayerLevelResponse {
    fn from(result: Resolution) -> Self {
        Self {
            view: result.into(),
            message: (!result.is_definitive()).then_some(NOT_FOUND_YET),
        }
    }
}

pub fn build_router(resolver: Resolver, deadline: Duration, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/player/{username}", get(player_level))
        .layer(cors)
        .with_state(AppState { resolver, deadline })
}

async fn health() -> &'static str {
    "ok"
}

async fn player_level(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    if PlayerName::parse(&username).is_none() {
        return (StatusCode::BAD_REQUEST, "username is required").into_response();
    }

    let result = state.resolver.resolve_within(&username, state.deadline).await;
    Json(PlayerLevelResponse::from(result)).into_response()
}
