mod internalstate;
mod matchhistory;
mod state_handler;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(state_handler::get_state))
        .route("/internalstate", get(internalstate::get_internal_state))
        .route("/matchhistory/:id", get(matchhistory::get_match_history))
        .with_state(state)
}
