use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{progress_store::ProgressStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the progress store, then watch its health and toggle degraded mode.
///
/// Runs forever; spawn it on the runtime.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ProgressStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_progress_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;

                warn!("exhausted storage reconnect attempts; dropping the connection");
                state.clear_progress_store().await;
                sleep(delay).await;
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store until it fails and cannot be reconnected.
async fn watch_health(state: &SharedState, store: &dyn ProgressStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Retry the connection with exponential backoff; degraded mode is entered on the first failure.
async fn reconnect(state: &SharedState, store: &dyn ProgressStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{
                AccountEntity, CompletionEntity, LeaderboardEntryEntity, ProgressEntity,
                ProgressSnapshot,
            },
            progress_store::memory::MemoryProgressStore,
            storage::StorageResult,
        },
        state::{
            AppState,
            tests::{CannedValidator, OfflineAssistant},
        },
    };

    #[derive(Debug, thiserror::Error)]
    #[error("link down")]
    struct LinkDown;

    /// Memory store whose connectivity can be cut.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryProgressStore,
        down: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn probe(&self) -> BoxFuture<'static, StorageResult<()>> {
            let down = self.down.load(Ordering::SeqCst);
            Box::pin(async move {
                if down {
                    Err(StorageError::unavailable("link down".into(), LinkDown))
                } else {
                    Ok(())
                }
            })
        }
    }

    impl ProgressStore for FlakyStore {
        fn find_account_by_name(
            &self,
            username: String,
        ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
            self.inner.find_account_by_name(username)
        }
        fn create_account(
            &self,
            username: String,
        ) -> BoxFuture<'static, StorageResult<AccountEntity>> {
            self.inner.create_account(username)
        }
        fn get_progress(
            &self,
            account_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
            self.inner.get_progress(account_id)
        }
        fn upsert_progress(
            &self,
            account_id: Uuid,
            snapshot: ProgressSnapshot,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.upsert_progress(account_id, snapshot)
        }
        fn add_completed_task(
            &self,
            account_id: Uuid,
            task_id: String,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.add_completed_task(account_id, task_id)
        }
        fn append_completion(
            &self,
            record: CompletionEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.append_completion(record)
        }
        fn top_scores(
            &self,
            limit: u32,
        ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
            self.inner.top_scores(limit)
        }
        fn reset_progress(&self, account_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.reset_progress(account_id)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.probe()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.probe()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outage_toggles_degraded_mode() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
            Arc::new(OfflineAssistant),
        );
        let store = FlakyStore::default();
        let down = store.down.clone();

        let connect_store = store.clone();
        tokio::spawn(run(state.clone(), move || {
            let store = connect_store.clone();
            async move {
                if store.down.load(Ordering::SeqCst) {
                    Err(StorageError::unavailable("link down".into(), LinkDown))
                } else {
                    Ok(Arc::new(store) as Arc<dyn ProgressStore>)
                }
            }
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());

        down.store(true, Ordering::SeqCst);
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded());

        down.store(false, Ordering::SeqCst);
        sleep(MAX_DELAY * 4).await;
        assert!(!state.is_degraded());
    }
}
