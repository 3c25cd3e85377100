use indexmap::IndexSet;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{AccountEntity, CompletionEntity, ProgressEntity, ProgressSnapshot},
    state::levels::{DEFAULT_START_POSITION, Position},
};

/// Identifiers are stored as their hyphenated string form.
pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn parse_id(raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|source| MongoDaoError::CorruptIdentifier {
        raw: raw.to_owned(),
        source,
    })
}

/// Fields written when a progress document is created by a partial update.
pub fn progress_defaults() -> Document {
    doc! {
        "score": 0_i64,
        "inventory": [],
        "position": {"x": DEFAULT_START_POSITION.x, "y": DEFAULT_START_POSITION.y},
        "avatar": null,
        "level_index": 0_i64,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAccountDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<AccountEntity> for MongoAccountDocument {
    fn from(value: AccountEntity) -> Self {
        Self {
            id: value.id.to_string(),
            username: value.username,
            avatar_url: value.avatar_url,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoAccountDocument> for AccountEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAccountDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            username: value.username,
            avatar_url: value.avatar_url,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProgressDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub completed_npcs: Vec<String>,
    #[serde(default)]
    pub level_index: i64,
    pub updated_at: DateTime,
}

impl From<ProgressEntity> for MongoProgressDocument {
    fn from(value: ProgressEntity) -> Self {
        let snapshot = value.snapshot;
        Self {
            id: value.account_id.to_string(),
            score: i64::try_from(snapshot.score).unwrap_or(i64::MAX),
            inventory: snapshot.inventory.into_iter().collect(),
            position: snapshot.position,
            avatar: snapshot.avatar,
            completed_npcs: snapshot.completed_tasks.into_iter().collect(),
            level_index: i64::from(snapshot.level_index),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoProgressDocument> for ProgressEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoProgressDocument) -> MongoResult<Self> {
        Ok(Self {
            account_id: parse_id(&value.id)?,
            snapshot: ProgressSnapshot {
                score: u64::try_from(value.score).unwrap_or(0),
                inventory: value.inventory.into_iter().collect::<IndexSet<_>>(),
                position: value.position,
                avatar: value.avatar,
                completed_tasks: value.completed_npcs.into_iter().collect::<IndexSet<_>>(),
                level_index: u32::try_from(value.level_index).unwrap_or(0),
            },
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCompletionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub npc_id: String,
    pub npc_type: String,
    pub submitted_content: String,
    pub ai_feedback: String,
    pub passed: bool,
    pub created_at: DateTime,
}

impl From<CompletionEntity> for MongoCompletionDocument {
    fn from(value: CompletionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            user_id: value.account_id.to_string(),
            npc_id: value.task_id,
            npc_type: value.task_type,
            submitted_content: value.submitted_content,
            ai_feedback: value.feedback,
            passed: value.passed,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_document_keeps_snapshot_fields() {
        let id = Uuid::new_v4();
        let mut entity = ProgressEntity::initial(id);
        entity.snapshot.score = 150;
        entity.snapshot.inventory.insert("lamp".into());
        entity.snapshot.completed_tasks.insert("t1".into());
        entity.snapshot.level_index = 2;

        let document = MongoProgressDocument::from(entity.clone());
        assert_eq!(document.id, id.to_string());
        assert_eq!(document.score, 150);

        let back = ProgressEntity::try_from(document).unwrap();
        assert_eq!(back.snapshot, entity.snapshot);
    }

    #[test]
    fn corrupt_identifier_is_reported() {
        let document = MongoAccountDocument {
            id: "not-a-uuid".into(),
            username: "Ada".into(),
            avatar_url: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };
        assert!(matches!(
            AccountEntity::try_from(document),
            Err(MongoDaoError::CorruptIdentifier { .. })
        ));
    }
}
