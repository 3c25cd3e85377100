use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::user::{
        CompleteNpcRequest, LeaderboardEntry, LeaderboardQuery, LoginRequest, LoginResponse,
        SaveProgressRequest, SaveProgressResponse, SuccessResponse, UserPayload,
        UserProgressResponse,
    },
    error::AppError,
    routes::ValidJson,
    services::user_service::{self, CompletionCommand, SaveOutcome},
    state::SharedState,
};

/// Account, progress and leaderboard endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/user/login", post(login))
        .route("/api/user/leaderboard/top", get(leaderboard))
        .route("/api/user/save", post(save_progress))
        .route("/api/user/complete-npc", post(complete_npc))
        .route("/api/user/{user_id}", get(get_progress))
}

/// Log in by name; unknown names are registered on the fly.
#[utoipa::path(
    post,
    path = "/api/user/login",
    tag = "user",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Username shorter than 2 characters"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    payload: ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let Valid(Json(payload)) = payload?;
    let outcome = user_service::login(&state, &payload.username).await?;
    Ok(Json(LoginResponse {
        success: true,
        is_new_user: outcome.is_new_user,
        user: UserPayload::new(outcome.account, outcome.progress),
    }))
}

/// Best scores; an unparseable `limit` falls back to the default.
#[utoipa::path(
    get,
    path = "/api/user/leaderboard/top",
    tag = "user",
    params(LeaderboardQuery),
    responses((status = 200, description = "Leaderboard, best first", body = [LeaderboardEntry]))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    let entries = user_service::leaderboard(&state, query.limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Stored progress of an account.
#[utoipa::path(
    get,
    path = "/api/user/{user_id}",
    tag = "user",
    params(("user_id" = Uuid, Path, description = "Account identifier")),
    responses((status = 200, description = "Progress (defaults when nothing was saved)", body = UserProgressResponse))
)]
pub async fn get_progress(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProgressResponse>, AppError> {
    let progress = user_service::get_progress(&state, user_id).await?;
    Ok(Json(UserProgressResponse {
        user_id,
        progress: progress.into(),
    }))
}

/// Replace the stored progress with the pushed snapshot.
#[utoipa::path(
    post,
    path = "/api/user/save",
    tag = "user",
    request_body = SaveProgressRequest,
    responses(
        (status = 200, description = "Saved, or skipped by the throttle", body = SaveProgressResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn save_progress(
    State(state): State<SharedState>,
    payload: ValidJson<SaveProgressRequest>,
) -> Result<Json<SaveProgressResponse>, AppError> {
    let Valid(Json(payload)) = payload?;
    let outcome = user_service::save_progress(
        &state,
        payload.user_id,
        payload.data.into(),
        payload.force_save,
    )
    .await?;

    let (saved, message) = match outcome {
        SaveOutcome::Saved => (true, "saved"),
        SaveOutcome::Throttled => (false, "skipped: saved too recently"),
    };
    Ok(Json(SaveProgressResponse {
        success: true,
        saved,
        message: message.to_owned(),
    }))
}

/// Record one task submission.
#[utoipa::path(
    post,
    path = "/api/user/complete-npc",
    tag = "user",
    request_body = CompleteNpcRequest,
    responses(
        (status = 200, description = "Recorded", body = SuccessResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn complete_npc(
    State(state): State<SharedState>,
    payload: ValidJson<CompleteNpcRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Valid(Json(payload)) = payload?;
    user_service::complete_task(
        &state,
        CompletionCommand {
            account_id: payload.user_id,
            task_id: payload.npc_id,
            task_type: payload.npc_type,
            content: payload.content,
            feedback: payload.feedback,
            passed: payload.passed,
        },
    )
    .await?;
    Ok(Json(SuccessResponse { success: true }))
}
