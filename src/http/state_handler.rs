use axum::extract::State;
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /state — the live PRE/LIVE view, `{id: mapped_match, ...}`, pretty-printed.
pub async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.projector.current().await;
    let body = serde_json::to_string_pretty(&view).expect("live view always serializes");
    ([(axum::http::header::CONTENT_TYPE, "application/json")], body)
}
