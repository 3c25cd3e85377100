pub mod leaderboard;
pub mod levels;
pub mod progression;
pub mod rewards;
pub mod throttle;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::progress_store::ProgressStore,
    error::ServiceError,
    services::task_validator::{AssistantChat, TaskValidator},
};

pub use self::leaderboard::LeaderboardCache;
pub use self::progression::{AbortError, ApplyError, Plan, PlanError, PlanId};
pub use self::throttle::SaveThrottle;

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, agent clients and the per-process save/leaderboard bookkeeping.
pub struct AppState {
    progress_store: RwLock<Option<Arc<dyn ProgressStore>>>,
    validator: Arc<dyn TaskValidator>,
    assistant: Arc<dyn AssistantChat>,
    config: AppConfig,
    save_throttle: SaveThrottle,
    leaderboard: LeaderboardCache,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        validator: Arc<dyn TaskValidator>,
        assistant: Arc<dyn AssistantChat>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            progress_store: RwLock::new(None),
            validator,
            assistant,
            config,
            save_throttle: SaveThrottle::default(),
            leaderboard: LeaderboardCache::default(),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current store, unless running degraded.
    pub async fn progress_store(&self) -> Option<Arc<dyn ProgressStore>> {
        if self.is_degraded() {
            return None;
        }
        let guard = self.progress_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`Self::progress_store`] but fails with [`ServiceError::Degraded`].
    pub async fn require_progress_store(&self) -> Result<Arc<dyn ProgressStore>, ServiceError> {
        self.progress_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_progress_store(&self, store: Arc<dyn ProgressStore>) {
        {
            let mut guard = self.progress_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_progress_store(&self) {
        {
            let mut guard = self.progress_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub(crate) fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Agent grading task submissions.
    pub fn validator(&self) -> Arc<dyn TaskValidator> {
        self.validator.clone()
    }

    /// Agent answering helper questions.
    pub fn assistant(&self) -> Arc<dyn AssistantChat> {
        self.assistant.clone()
    }

    /// Static level catalog and drop policy.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Per-account gate for non-forced saves.
    pub fn save_throttle(&self) -> &SaveThrottle {
        &self.save_throttle
    }

    /// Short-lived leaderboard cache.
    pub fn leaderboard_cache(&self) -> &LeaderboardCache {
        &self.leaderboard
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        dao::progress_store::memory::MemoryProgressStore,
        services::task_validator::{
            AssistantQuestion, AssistantReply, ValidatorError, ValidatorResult, Verdict,
        },
        state::levels::ValidatorTarget,
    };

    /// Validator answering every submission with the same canned verdict.
    pub(crate) struct CannedValidator(pub(crate) ValidatorResult<Verdict>);

    impl CannedValidator {
        pub(crate) fn passing(score: Option<f64>) -> Self {
            Self(Ok(Verdict {
                passed: true,
                feedback: "well done".into(),
                score,
                long_content: None,
            }))
        }
    }

    impl TaskValidator for CannedValidator {
        fn validate(
            &self,
            _target: ValidatorTarget,
            _content: String,
        ) -> BoxFuture<'static, ValidatorResult<Verdict>> {
            let outcome = match &self.0 {
                Ok(verdict) => Ok(verdict.clone()),
                Err(_) => Err(ValidatorError::Malformed {
                    reason: "canned failure".into(),
                }),
            };
            Box::pin(async move { outcome })
        }
    }

    /// Assistant that is never configured.
    pub(crate) struct OfflineAssistant;

    impl AssistantChat for OfflineAssistant {
        fn ask(
            &self,
            _question: AssistantQuestion,
        ) -> BoxFuture<'static, ValidatorResult<AssistantReply>> {
            Box::pin(async {
                Err(ValidatorError::NotConfigured {
                    what: "COZE_API_KEY",
                })
            })
        }
    }

    /// Healthy state backed by a fresh in-memory store.
    pub(crate) async fn memory_state(
        config: AppConfig,
        validator: Arc<dyn TaskValidator>,
    ) -> (SharedState, MemoryProgressStore) {
        let store = MemoryProgressStore::new();
        let state = AppState::new(config, validator, Arc::new(OfflineAssistant));
        state.install_progress_store(Arc::new(store.clone())).await;
        (state, store)
    }

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
            Arc::new(OfflineAssistant),
        );
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_progress_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_progress_store(Arc::new(MemoryProgressStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_progress_store().await;
        assert!(state.progress_store().await.is_none());
    }
}
