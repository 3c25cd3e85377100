use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dto::validation::validate_not_blank, services::task_validator::Verdict};

/// Which agent grades the submission; `workflowId` wins over `botId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NpcConfigDto {
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub npc_config: NpcConfigDto,
    #[validate(custom(function = "validate_not_blank"))]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub passed: bool,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_content: Option<String>,
}

impl From<Verdict> for ValidateResponse {
    fn from(value: Verdict) -> Self {
        Self {
            passed: value.passed,
            feedback: value.feedback,
            score: value.score,
            long_content: value.long_content,
        }
    }
}

impl From<ValidateResponse> for Verdict {
    fn from(value: ValidateResponse) -> Self {
        Self {
            passed: value.passed,
            feedback: value.feedback,
            score: value.score,
            long_content: value.long_content,
        }
    }
}
