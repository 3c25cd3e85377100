//! Process-local store used for `STORAGE_BACKEND=memory` and tests.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{
        AccountEntity, CompletionEntity, LeaderboardEntryEntity, ProgressEntity, ProgressSnapshot,
    },
    progress_store::ProgressStore,
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
pub struct MemoryProgressStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, AccountEntity>,
    names: HashMap<String, Uuid>,
    progress: HashMap<Uuid, ProgressEntity>,
    completions: Vec<CompletionEntity>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion log of one account, oldest first.
    pub async fn completions_for(&self, account_id: Uuid) -> Vec<CompletionEntity> {
        let guard = self.inner.read().await;
        guard
            .completions
            .iter()
            .filter(|record| record.account_id == account_id)
            .cloned()
            .collect()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn find_account_by_name(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard
                .names
                .get(&username)
                .and_then(|id| guard.accounts.get(id))
                .cloned())
        })
    }

    fn create_account(&self, username: String) -> BoxFuture<'static, StorageResult<AccountEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            if guard.names.contains_key(&username) {
                return Err(StorageError::conflict(format!(
                    "username `{username}` already taken"
                )));
            }

            let account = AccountEntity::new(username);
            guard.names.insert(account.username.clone(), account.id);
            guard
                .progress
                .insert(account.id, ProgressEntity::initial(account.id));
            guard.accounts.insert(account.id, account.clone());
            Ok(account)
        })
    }

    fn get_progress(
        &self,
        account_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.progress.get(&account_id).cloned()) })
    }

    fn upsert_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            guard.progress.insert(
                account_id,
                ProgressEntity {
                    account_id,
                    snapshot,
                    updated_at: SystemTime::now(),
                },
            );
            Ok(())
        })
    }

    fn add_completed_task(
        &self,
        account_id: Uuid,
        task_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            let entry = guard
                .progress
                .entry(account_id)
                .or_insert_with(|| ProgressEntity::initial(account_id));
            entry.snapshot.completed_tasks.insert(task_id);
            entry.updated_at = SystemTime::now();
            Ok(())
        })
    }

    fn append_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.completions.push(record);
            Ok(())
        })
    }

    fn top_scores(
        &self,
        limit: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            let mut rows: Vec<LeaderboardEntryEntity> = guard
                .progress
                .values()
                .filter(|progress| progress.snapshot.score > 0)
                .filter_map(|progress| {
                    guard
                        .accounts
                        .get(&progress.account_id)
                        .map(|account| LeaderboardEntryEntity {
                            name: account.username.clone(),
                            score: progress.snapshot.score,
                        })
                })
                .collect();
            rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
            rows.truncate(limit as usize);
            Ok(rows)
        })
    }

    fn reset_progress(&self, account_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .write()
                .await
                .progress
                .insert(account_id, ProgressEntity::initial(account_id));
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
