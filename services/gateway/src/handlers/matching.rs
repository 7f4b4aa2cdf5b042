use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use matchmaker::UserState;
use serde_json::{Value, json};

/// Liveness plus a few gauges; 503 once the coordinator lost its store
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let coordinator = &state.coordinator;
    if !coordinator.is_healthy() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "connections": coordinator.registry().len(),
            "searches": coordinator.active_searches(),
            "pendingPairs": coordinator.active_timers(),
        })),
    )
}

/// The caller's stored request and pair
pub async fn match_state(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserState>, AppError> {
    let snapshot = state.coordinator.state_of(&user.user_id).await?;
    Ok(Json(snapshot))
}
