use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /internalstate — every known match's current rendered state, merged
/// into one object keyed by id. Unlike `/state`, this includes matches
/// whose current status is `REMOVED`.
pub async fn get_internal_state(State(state): State<AppState>) -> impl IntoResponse {
    let mut merged = BTreeMap::new();
    for id in state.history.all_ids().await {
        if let Some(current) = state.history.current(id).await {
            merged.insert(id, current);
        }
    }

    let body = serde_json::to_string_pretty(&merged).expect("internal state always serializes");
    ([(axum::http::header::CONTENT_TYPE, "application/json")], body)
}
