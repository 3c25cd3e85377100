//! DTO definitions of the `/api/user` endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{AccountEntity, LeaderboardEntryEntity, ProgressSnapshot},
    dto::validation::{validate_not_blank, validate_username},
    state::levels::Position,
};

/// Login (or implicit registration) by unique display name.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
}

/// Game state as exchanged with clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressDto {
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub completed_npcs: Vec<String>,
    #[serde(default)]
    pub level_index: u32,
}

impl From<ProgressSnapshot> for ProgressDto {
    fn from(value: ProgressSnapshot) -> Self {
        Self {
            score: value.score,
            inventory: value.inventory.into_iter().collect(),
            position: value.position,
            avatar: value.avatar,
            completed_npcs: value.completed_tasks.into_iter().collect(),
            level_index: value.level_index,
        }
    }
}

/// Duplicate inventory items and completed ids collapse into one entry.
impl From<ProgressDto> for ProgressSnapshot {
    fn from(value: ProgressDto) -> Self {
        Self {
            score: value.score,
            inventory: value.inventory.into_iter().collect(),
            position: value.position,
            avatar: value.avatar,
            completed_tasks: value.completed_npcs.into_iter().collect(),
            level_index: value.level_index,
        }
    }
}

/// Account identity plus its current progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPayload {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub progress: ProgressDto,
}

impl UserPayload {
    pub fn new(account: AccountEntity, progress: ProgressSnapshot) -> Self {
        Self {
            id: account.id,
            username: account.username,
            avatar_url: account.avatar_url,
            progress: progress.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub is_new_user: bool,
    pub user: UserPayload,
}

/// Stored progress of one account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProgressResponse {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub progress: ProgressDto,
}

/// Full snapshot pushed by the client; `forceSave` bypasses the per-account throttle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    pub user_id: Uuid,
    pub data: ProgressDto,
    #[serde(default)]
    pub force_save: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaveProgressResponse {
    pub success: bool,
    /// False when the save was absorbed by the throttle.
    pub saved: bool,
    pub message: String,
}

/// Completion record of one task submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteNpcRequest {
    pub user_id: Uuid,
    #[validate(custom(function = "validate_not_blank"))]
    pub npc_id: String,
    #[serde(default)]
    pub npc_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Number of rows, 1 to 100 (default 10).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u64,
}

impl From<LeaderboardEntryEntity> for LeaderboardEntry {
    fn from(value: LeaderboardEntryEntity) -> Self {
        Self {
            name: value.name,
            score: value.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn login_response_mixes_camel_case_envelope_with_flat_progress() {
        let response = LoginResponse {
            success: true,
            is_new_user: true,
            user: UserPayload {
                id: Uuid::nil(),
                username: "Ada".into(),
                avatar_url: None,
                progress: ProgressDto {
                    score: 150,
                    inventory: vec!["lamp".into()],
                    position: Position::new(7, 6),
                    avatar: Some("fox".into()),
                    completed_npcs: vec!["t1".into()],
                    level_index: 1,
                },
            },
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "isNewUser": true,
                "user": {
                    "id": Uuid::nil().to_string(),
                    "username": "Ada",
                    "avatar_url": null,
                    "score": 150,
                    "inventory": ["lamp"],
                    "position": {"x": 7, "y": 6},
                    "avatar": "fox",
                    "completed_npcs": ["t1"],
                    "level_index": 1
                }
            })
        );
    }

    #[test]
    fn save_request_reads_camel_case_keys() {
        let id = Uuid::new_v4();
        let request: SaveProgressRequest = serde_json::from_value(json!({
            "userId": id,
            "data": {
                "score": 20,
                "inventory": ["key", "key"],
                "position": {"x": 2, "y": 3},
                "avatar": null,
                "completed_npcs": ["t1"],
                "level_index": 0
            },
            "forceSave": true
        }))
        .unwrap();

        assert_eq!(request.user_id, id);
        assert!(request.force_save);
        assert_eq!(request.data.score, 20);
        assert_eq!(request.data.position, Position::new(2, 3));
        assert_eq!(ProgressSnapshot::from(request.data).inventory.len(), 1);
    }

    #[test]
    fn force_save_defaults_to_false() {
        let request: SaveProgressRequest = serde_json::from_value(json!({
            "userId": Uuid::nil(),
            "data": {"score": 5}
        }))
        .unwrap();

        assert!(!request.force_save);
        assert_eq!(request.data.score, 5);
        assert_eq!(request.data.level_index, 0);
    }

    #[test]
    fn snake_case_save_keys_are_rejected() {
        let result = serde_json::from_value::<SaveProgressRequest>(json!({
            "user_id": Uuid::nil(),
            "data": {}
        }));
        assert!(result.is_err());
    }
}
