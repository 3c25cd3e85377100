pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    AccountEntity, CompletionEntity, LeaderboardEntryEntity, ProgressEntity, ProgressSnapshot,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for accounts, progress and completion logs.
///
/// Every operation is atomic from the caller's point of view. Progress writes are
/// last-writer-wins: there is no version token, one active session per account is assumed.
pub trait ProgressStore: Send + Sync {
    fn find_account_by_name(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>>;
    /// Fails with [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict)
    /// when the name is already taken.
    fn create_account(&self, username: String) -> BoxFuture<'static, StorageResult<AccountEntity>>;
    fn get_progress(&self, account_id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>>;
    fn upsert_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn add_completed_task(
        &self,
        account_id: Uuid,
        task_id: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn append_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Accounts with a positive score, best first.
    fn top_scores(&self, limit: u32)
    -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>>;
    fn reset_progress(&self, account_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
