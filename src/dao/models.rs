use std::time::SystemTime;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::levels::{DEFAULT_START_POSITION, Position};

/// Registered player identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountEntity {
    /// Opaque unique identifier.
    pub id: Uuid,
    /// Unique, case-sensitive display name used to log in.
    pub username: String,
    /// Optional avatar reference.
    pub avatar_url: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the account row changed.
    pub updated_at: SystemTime,
}

impl AccountEntity {
    /// Build a brand-new account with a fresh identifier.
    pub fn new(username: String) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            username,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mutable game state of one account, exactly as the client pushes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Accumulated score.
    pub score: u64,
    /// Collected items; set semantics, insertion ordered.
    pub inventory: IndexSet<String>,
    /// Avatar tile position.
    pub position: Position,
    /// Avatar reference, if any.
    pub avatar: Option<String>,
    /// Ids of passed tasks; only ever grows.
    pub completed_tasks: IndexSet<String>,
    /// Index of the active level.
    pub level_index: u32,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            score: 0,
            inventory: IndexSet::new(),
            position: DEFAULT_START_POSITION,
            avatar: None,
            completed_tasks: IndexSet::new(),
            level_index: 0,
        }
    }
}

/// Persisted progress record (one per account).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEntity {
    /// Owning account.
    pub account_id: Uuid,
    /// Stored snapshot.
    pub snapshot: ProgressSnapshot,
    /// Last write time.
    pub updated_at: SystemTime,
}

impl ProgressEntity {
    /// Default record for an account that never saved.
    pub fn initial(account_id: Uuid) -> Self {
        Self {
            account_id,
            snapshot: ProgressSnapshot::default(),
            updated_at: SystemTime::now(),
        }
    }
}

/// Append-only log entry written for every task submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionEntity {
    /// Record identifier.
    pub id: Uuid,
    /// Submitting account.
    pub account_id: Uuid,
    /// Task (NPC) identifier.
    pub task_id: String,
    /// Task category.
    pub task_type: String,
    /// Text submitted by the player.
    pub submitted_content: String,
    /// Feedback returned by the validator.
    pub feedback: String,
    /// Validator verdict.
    pub passed: bool,
    /// Submission time.
    pub created_at: SystemTime,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntryEntity {
    /// Account display name.
    pub name: String,
    /// Account score.
    pub score: u64,
}
