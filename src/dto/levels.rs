use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{levels::LevelCatalog, rewards::DropPolicy};

/// Level catalog and drop policy served to game clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelsResponse {
    /// Ordered levels with their maps and NPCs.
    #[schema(value_type = Object)]
    pub catalog: LevelCatalog,
    /// Prize drop probability and pool.
    #[schema(value_type = Object)]
    pub drop_policy: DropPolicy,
}
