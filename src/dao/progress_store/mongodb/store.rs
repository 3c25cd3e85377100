use std::{collections::HashMap, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoAccountDocument, MongoCompletionDocument, MongoProgressDocument, doc_id,
        progress_defaults,
    },
};
use crate::dao::{
    models::{
        AccountEntity, CompletionEntity, LeaderboardEntryEntity, ProgressEntity, ProgressSnapshot,
    },
    progress_store::ProgressStore,
    storage::StorageResult,
};

const ACCOUNT_COLLECTION_NAME: &str = "accounts";
const PROGRESS_COLLECTION_NAME: &str = "progress";
const COMPLETION_COLLECTION_NAME: &str = "completions";

#[derive(Clone)]
pub struct MongoProgressStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoProgressStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let accounts = self.accounts().await;
        let username_index = IndexModel::builder()
            .keys(doc! {"username": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("account_username_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        accounts
            .create_index(username_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ACCOUNT_COLLECTION_NAME,
                index: "username",
                source,
            })?;

        let progress = self.progress().await;
        let score_index = IndexModel::builder()
            .keys(doc! {"score": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("progress_score_idx".to_owned()))
                    .build(),
            )
            .build();
        progress
            .create_index(score_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PROGRESS_COLLECTION_NAME,
                index: "score",
                source,
            })?;

        let completions = self.completions().await;
        let user_index = IndexModel::builder()
            .keys(doc! {"user_id": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("completion_user_idx".to_owned()))
                    .build(),
            )
            .build();
        completions
            .create_index(user_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: COMPLETION_COLLECTION_NAME,
                index: "user_id,created_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn accounts(&self) -> Collection<MongoAccountDocument> {
        self.database()
            .await
            .collection::<MongoAccountDocument>(ACCOUNT_COLLECTION_NAME)
    }

    async fn progress(&self) -> Collection<MongoProgressDocument> {
        self.database()
            .await
            .collection::<MongoProgressDocument>(PROGRESS_COLLECTION_NAME)
    }

    async fn completions(&self) -> Collection<MongoCompletionDocument> {
        self.database()
            .await
            .collection::<MongoCompletionDocument>(COMPLETION_COLLECTION_NAME)
    }

    async fn find_account_by_name(&self, username: String) -> MongoResult<Option<AccountEntity>> {
        let document = self
            .accounts()
            .await
            .find_one(doc! {"username": username.as_str()})
            .await
            .map_err(|source| MongoDaoError::LoadAccount { username, source })?;

        document.map(AccountEntity::try_from).transpose()
    }

    /// Insert the account, then its initial progress document.
    async fn create_account(&self, username: String) -> MongoResult<AccountEntity> {
        let account = AccountEntity::new(username);
        let document = MongoAccountDocument::from(account.clone());

        self.accounts()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateAccount {
                        username: account.username.clone(),
                    }
                } else {
                    MongoDaoError::CreateAccount {
                        username: account.username.clone(),
                        source,
                    }
                }
            })?;

        self.reset_progress(account.id).await?;
        Ok(account)
    }

    async fn get_progress(&self, id: Uuid) -> MongoResult<Option<ProgressEntity>> {
        let document = self
            .progress()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadProgress { id, source })?;

        document.map(ProgressEntity::try_from).transpose()
    }

    async fn replace_progress(&self, entity: ProgressEntity) -> MongoResult<()> {
        let id = entity.account_id;
        let document = MongoProgressDocument::from(entity);
        self.progress()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveProgress { id, source })?;
        Ok(())
    }

    async fn upsert_progress(&self, id: Uuid, snapshot: ProgressSnapshot) -> MongoResult<()> {
        let mut entity = ProgressEntity::initial(id);
        entity.snapshot = snapshot;
        self.replace_progress(entity).await
    }

    async fn reset_progress(&self, id: Uuid) -> MongoResult<()> {
        self.replace_progress(ProgressEntity::initial(id)).await
    }

    async fn add_completed_task(&self, id: Uuid, task_id: String) -> MongoResult<()> {
        self.progress()
            .await
            .update_one(
                doc_id(id),
                doc! {
                    "$addToSet": {"completed_npcs": task_id},
                    "$set": {"updated_at": DateTime::now()},
                    "$setOnInsert": progress_defaults(),
                },
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveProgress { id, source })?;
        Ok(())
    }

    async fn append_completion(&self, record: CompletionEntity) -> MongoResult<()> {
        let id = record.account_id;
        let document = MongoCompletionDocument::from(record);
        self.completions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendCompletion { id, source })?;
        Ok(())
    }

    async fn top_scores(&self, limit: u32) -> MongoResult<Vec<LeaderboardEntryEntity>> {
        let rows: Vec<MongoProgressDocument> = self
            .progress()
            .await
            .find(doc! {"score": {"$gt": 0_i64}})
            .sort(doc! {"score": -1, "_id": 1})
            .limit(i64::from(limit))
            .await
            .map_err(|source| MongoDaoError::Leaderboard { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Leaderboard { source })?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let accounts: Vec<MongoAccountDocument> = self
            .accounts()
            .await
            .find(doc! {"_id": {"$in": ids}})
            .await
            .map_err(|source| MongoDaoError::Leaderboard { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Leaderboard { source })?;

        let names: HashMap<String, String> = accounts
            .into_iter()
            .map(|account| (account.id, account.username))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let Some(name) = names.get(&row.id) else {
                    debug!(account = %row.id, "progress without account skipped");
                    return None;
                };
                Some(LeaderboardEntryEntity {
                    name: name.clone(),
                    score: u64::try_from(row.score).unwrap_or(0),
                })
            })
            .collect())
    }
}

impl ProgressStore for MongoProgressStore {
    fn find_account_by_name(
        &self,
        username: String,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_account_by_name(username)
                .await
                .map_err(Into::into)
        })
    }

    fn create_account(&self, username: String) -> BoxFuture<'static, StorageResult<AccountEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_account(username).await.map_err(Into::into) })
    }

    fn get_progress(
        &self,
        account_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.get_progress(account_id).await.map_err(Into::into) })
    }

    fn upsert_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_progress(account_id, snapshot)
                .await
                .map_err(Into::into)
        })
    }

    fn add_completed_task(
        &self,
        account_id: Uuid,
        task_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .add_completed_task(account_id, task_id)
                .await
                .map_err(Into::into)
        })
    }

    fn append_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_completion(record).await.map_err(Into::into) })
    }

    fn top_scores(
        &self,
        limit: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_scores(limit).await.map_err(Into::into) })
    }

    fn reset_progress(&self, account_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reset_progress(account_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
