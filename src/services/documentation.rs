use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Evolution Town Back.
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::user::login,
        crate::routes::user::leaderboard,
        crate::routes::user::get_progress,
        crate::routes::user::save_progress,
        crate::routes::user::complete_npc,
        crate::routes::validate::validate,
        crate::routes::assistant::ask,
        crate::routes::levels::levels,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::user::LoginRequest,
            crate::dto::user::LoginResponse,
            crate::dto::user::UserPayload,
            crate::dto::user::ProgressDto,
            crate::dto::user::UserProgressResponse,
            crate::dto::user::SaveProgressRequest,
            crate::dto::user::SaveProgressResponse,
            crate::dto::user::CompleteNpcRequest,
            crate::dto::user::SuccessResponse,
            crate::dto::user::LeaderboardEntry,
            crate::dto::validate::NpcConfigDto,
            crate::dto::validate::ValidateRequest,
            crate::dto::validate::ValidateResponse,
            crate::dto::assistant::AssistantRequest,
            crate::dto::assistant::AssistantResponse,
            crate::dto::levels::LevelsResponse,
            crate::state::levels::Position,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "user", description = "Accounts, progress and leaderboard"),
        (name = "validate", description = "Task submission grading"),
        (name = "assistant", description = "In-game assistant chat"),
        (name = "levels", description = "Static level catalog"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/user/login",
            "/api/user/leaderboard/top",
            "/api/user/{user_id}",
            "/api/user/save",
            "/api/user/complete-npc",
            "/api/validate",
            "/api/assistant",
            "/api/levels",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
