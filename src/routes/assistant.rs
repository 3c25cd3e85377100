use axum::{Json, Router, extract::State, routing::post};
use axum_valid::Valid;

use crate::{
    dto::assistant::{AssistantRequest, AssistantResponse},
    error::AppError,
    routes::ValidJson,
    services::{assistant_service, task_validator::AssistantQuestion},
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/api/assistant", post(ask))
}

/// Ask the in-game assistant. Falls back to a canned answer when the agent is unavailable.
#[utoipa::path(
    post,
    path = "/api/assistant",
    tag = "assistant",
    request_body = AssistantRequest,
    responses(
        (status = 200, description = "Answer", body = AssistantResponse),
        (status = 400, description = "Empty message")
    )
)]
pub async fn ask(
    State(state): State<SharedState>,
    payload: ValidJson<AssistantRequest>,
) -> Result<Json<AssistantResponse>, AppError> {
    let Valid(Json(payload)) = payload?;
    let reply = assistant_service::ask(
        &state,
        AssistantQuestion {
            message: payload.message,
            conversation_id: payload.conversation_id,
            user_id: payload.user_id,
        },
    )
    .await?;
    Ok(Json(AssistantResponse {
        answer: reply.answer,
        conversation_id: reply.conversation_id,
    }))
}
