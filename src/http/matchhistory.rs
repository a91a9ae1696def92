use axum::extract::{Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /matchhistory/:id — the full recorded history for one match id.
pub async fn get_match_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found("no history for match id"))?;

    let history = state.history.history(id).await;
    if history.is_empty() {
        return Err(ApiError::not_found("no history for match id"));
    }

    let body = serde_json::to_string_pretty(&history).expect("history always serializes");
    Ok(([(axum::http::header::CONTENT_TYPE, "application/json")], body))
}
