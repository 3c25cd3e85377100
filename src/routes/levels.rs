use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::levels::LevelsResponse, state::SharedState};

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/levels", get(levels))
}

/// Level catalog and prize drop policy.
#[utoipa::path(
    get,
    path = "/api/levels",
    tag = "levels",
    responses((status = 200, description = "Configured levels", body = LevelsResponse))
)]
pub async fn levels(State(state): State<SharedState>) -> Json<LevelsResponse> {
    let config = state.config();
    Json(LevelsResponse {
        catalog: config.catalog().as_ref().clone(),
        drop_policy: config.drop_policy().clone(),
    })
}
