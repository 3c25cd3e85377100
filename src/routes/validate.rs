use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::validate::{ValidateRequest, ValidateResponse},
    error::AppError,
    routes::ValidJson,
    services::validation_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/validate", post(validate))
}

/// Grade a task submission. Agent failures still answer 200 with `passed: false`.
#[utoipa::path(
    post,
    path = "/api/validate",
    tag = "validate",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Verdict", body = ValidateResponse),
        (status = 400, description = "Empty content or no workflowId/botId")
    )
)]
pub async fn validate(
    State(state): State<SharedState>,
    payload: ValidJson<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    let Valid(Json(payload)) = payload?;
    let target = validation_service::resolve_target(
        payload.npc_config.workflow_id,
        payload.npc_config.bot_id,
    )?;
    let verdict = validation_service::validate_submission(&state, target, payload.content).await?;
    Ok(Json(verdict.into()))
}
