use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::live_scores::provider::{validate_league, validate_match_id, validate_season};
use crate::poller::{Command, CommandReply, Orchestrator};
use crate::store::models::{LocalData, Preferences};
use crate::store::{update_local_data, Store};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn Store>,
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Build the Axum router for the command API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/commands/poll-now", post(poll_now_handler))
        .route("/api/commands/update-badge", post(update_badge_handler))
        .route("/api/commands/reschedule", post(reschedule_handler))
        .route("/api/status", get(status_handler))
        .route("/api/matches", get(matches_handler))
        .route(
            "/api/preferences",
            get(get_preferences_handler).put(put_preferences_handler),
        )
        .route("/api/watchlist", get(watchlist_handler))
        .route(
            "/api/watchlist/:id",
            post(watch_handler).delete(unwatch_handler),
        )
        .route("/api/watchlist/:id/toggle", post(toggle_handler))
        .route("/api/notifications", get(notifications_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Commands ──

async fn poll_now_handler(State(state): State<Arc<AppState>>) -> Json<CommandReply> {
    Json(state.orchestrator.dispatch(Command::PollNow).await)
}

async fn update_badge_handler(State(state): State<Arc<AppState>>) -> Json<CommandReply> {
    Json(state.orchestrator.dispatch(Command::UpdateBadge).await)
}

async fn reschedule_handler(State(state): State<Arc<AppState>>) -> Json<CommandReply> {
    Json(state.orchestrator.dispatch(Command::Reschedule).await)
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.status())
}

// ── Data ──

/// GET /api/matches
async fn matches_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_local_data()
        .await
        .map(|local| Json(local.snapshot))
        .map_err(internal)
}

async fn get_preferences_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.get_preferences().await.map(Json).map_err(internal)
}

/// PUT /api/preferences with a full or partial preferences object. Fields
/// not in the body keep their stored values. Saving re-arms the poll timer.
async fn put_preferences_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    if !patch.is_object() {
        return Err(bad_request("preferences update must be a JSON object"));
    }
    let current = state.store.get_preferences().await.map_err(internal)?;
    let prefs: Preferences = current.merged(patch).map_err(bad_request)?;
    validate_league(&prefs.league_shortcut).map_err(bad_request)?;
    validate_season(prefs.season_year).map_err(bad_request)?;
    state.store.save_preferences(&prefs).await.map_err(internal)?;
    info!(
        "Preferences saved: {} {}",
        prefs.league_shortcut, prefs.season_year
    );
    Ok(Json(state.orchestrator.dispatch(Command::Reschedule).await))
}

#[derive(Debug, Serialize)]
struct WatchlistResponse {
    watchlist: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watching: Option<bool>,
    /// Outcome of the badge refresh that follows every edit
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<CommandReply>,
}

/// GET /api/watchlist
async fn watchlist_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let local = state.store.get_local_data().await.map_err(internal)?;
    Ok(Json(WatchlistResponse {
        watchlist: local.watchlist,
        watching: None,
        badge: None,
    }))
}

async fn edit_watchlist(
    state: &AppState,
    match_id: i64,
    edit: fn(&mut LocalData, i64) -> bool,
) -> Result<Json<WatchlistResponse>, ApiError> {
    validate_match_id(match_id).map_err(bad_request)?;
    let (watching, watchlist) = update_local_data(state.store.as_ref(), move |data| {
        edit(data, match_id);
        (data.is_watched(match_id), data.watchlist.clone())
    })
    .await
    .map_err(internal)?;
    let badge = state.orchestrator.dispatch(Command::UpdateBadge).await;
    if !badge.success {
        warn!(
            "Watchlist updated for match {} but badge refresh failed: {}",
            match_id,
            badge.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(Json(WatchlistResponse {
        watchlist,
        watching: Some(watching),
        badge: Some(badge),
    }))
}

async fn watch_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    edit_watchlist(&state, match_id, |data, id| data.watch(id)).await
}

async fn unwatch_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    edit_watchlist(&state, match_id, |data, id| data.unwatch(id)).await
}

async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    edit_watchlist(&state, match_id, |data, id| data.toggle_watch(id)).await
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

/// GET /api/notifications?limit=50
async fn notifications_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    state
        .store
        .recent_notifications(limit)
        .await
        .map(Json)
        .map_err(internal)
}
