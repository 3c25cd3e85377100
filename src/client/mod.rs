//! Player-side session logic: local game state, its synchronization with the
//! backend, level progression and task rewards.
//!
//! The [`GameBackend`] seam lets the same session run against the HTTP API
//! ([`http::HttpBackend`]) or directly against an in-process [`SharedState`](crate::state::SharedState)
//! ([`local::LocalBackend`]).

pub mod http;
pub mod local;
pub mod session;
pub mod synchronizer;

use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::ProgressSnapshot, dto::user::LeaderboardEntry,
    services::task_validator::Verdict, state::levels::ValidatorTarget,
};

pub use self::http::HttpBackend;
pub use self::local::LocalBackend;
pub use self::session::{LevelEvent, PlayerSession, SubmissionOutcome};
pub use self::synchronizer::ProgressSynchronizer;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced to the game front-end.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got an answer.
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with an error status.
    #[error("{endpoint} answered {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// The operation needs a logged-in player.
    #[error("no player is logged in")]
    NotLoggedIn,
    /// No NPC carries this id.
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    /// The NPC exists but does not carry a gated task (e.g. the assistant).
    #[error("`{0}` is not a task")]
    NotATask(String),
    /// The level is not unlocked yet.
    #[error("level {0} is locked")]
    LevelLocked(usize),
    /// The request was refused before reaching the backend.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Account and stored progress returned by a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub account_id: Uuid,
    pub username: String,
    pub is_new_user: bool,
    pub progress: ProgressSnapshot,
}

/// One task submission as logged by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub account_id: Uuid,
    pub task_id: String,
    pub task_type: String,
    pub content: String,
    pub feedback: String,
    pub passed: bool,
}

/// Backend operations a player session relies on.
pub trait GameBackend: Send + Sync {
    fn login(&self, username: String) -> BoxFuture<'static, ClientResult<LoginResult>>;
    /// `force` bypasses the server-side save throttle.
    fn save_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
        force: bool,
    ) -> BoxFuture<'static, ClientResult<()>>;
    fn complete_task(&self, report: CompletionReport) -> BoxFuture<'static, ClientResult<()>>;
    /// Grading never fails on agent trouble; the backend answers a failed verdict instead.
    fn validate(
        &self,
        target: ValidatorTarget,
        content: String,
    ) -> BoxFuture<'static, ClientResult<Verdict>>;
    fn leaderboard(&self, limit: u32) -> BoxFuture<'static, ClientResult<Vec<LeaderboardEntry>>>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio::time::{Instant, sleep};

    use super::*;

    /// One save as seen by [`RecordingBackend`].
    #[derive(Debug, Clone)]
    pub(crate) struct SavedCall {
        pub(crate) snapshot: ProgressSnapshot,
        pub(crate) force: bool,
        pub(crate) finished_at: Instant,
    }

    #[derive(Default)]
    struct Recorded {
        saves: Vec<SavedCall>,
        completions: Vec<CompletionReport>,
    }

    /// Backend keeping every call in memory; saves take `save_delay` to complete.
    #[derive(Clone)]
    pub(crate) struct RecordingBackend {
        recorded: Arc<Mutex<Recorded>>,
        verdict: Arc<Mutex<Verdict>>,
        save_delay: Duration,
        stored: ProgressSnapshot,
        failing: bool,
    }

    impl RecordingBackend {
        pub(crate) fn new(save_delay: Duration) -> Self {
            Self {
                recorded: Arc::default(),
                verdict: Arc::new(Mutex::new(Verdict {
                    passed: true,
                    feedback: "well done".into(),
                    score: None,
                    long_content: None,
                })),
                save_delay,
                stored: ProgressSnapshot::default(),
                failing: false,
            }
        }

        /// Every save is recorded, then reported as failed.
        pub(crate) fn failing(mut self) -> Self {
            self.failing = true;
            self
        }

        pub(crate) fn with_stored(mut self, stored: ProgressSnapshot) -> Self {
            self.stored = stored;
            self
        }

        pub(crate) fn set_verdict(&self, verdict: Verdict) {
            *self.verdict.lock().unwrap() = verdict;
        }

        pub(crate) fn saves(&self) -> Vec<SavedCall> {
            self.recorded.lock().unwrap().saves.clone()
        }

        pub(crate) fn completions(&self) -> Vec<CompletionReport> {
            self.recorded.lock().unwrap().completions.clone()
        }
    }

    impl GameBackend for RecordingBackend {
        fn login(&self, username: String) -> BoxFuture<'static, ClientResult<LoginResult>> {
            let progress = self.stored.clone();
            Box::pin(async move {
                Ok(LoginResult {
                    account_id: Uuid::nil(),
                    username,
                    is_new_user: false,
                    progress,
                })
            })
        }

        fn save_progress(
            &self,
            _account_id: Uuid,
            snapshot: ProgressSnapshot,
            force: bool,
        ) -> BoxFuture<'static, ClientResult<()>> {
            let recorded = self.recorded.clone();
            let delay = self.save_delay;
            let failing = self.failing;
            Box::pin(async move {
                sleep(delay).await;
                recorded.lock().unwrap().saves.push(SavedCall {
                    snapshot,
                    force,
                    finished_at: Instant::now(),
                });
                if failing {
                    return Err(ClientError::Status {
                        endpoint: "/api/user/save".into(),
                        status: 503,
                        message: "service temporarily unavailable".into(),
                    });
                }
                Ok(())
            })
        }

        fn complete_task(&self, report: CompletionReport) -> BoxFuture<'static, ClientResult<()>> {
            self.recorded.lock().unwrap().completions.push(report);
            Box::pin(async { Ok(()) })
        }

        fn validate(
            &self,
            _target: ValidatorTarget,
            _content: String,
        ) -> BoxFuture<'static, ClientResult<Verdict>> {
            let verdict = self.verdict.lock().unwrap().clone();
            Box::pin(async move { Ok(verdict) })
        }

        fn leaderboard(
            &self,
            _limit: u32,
        ) -> BoxFuture<'static, ClientResult<Vec<LeaderboardEntry>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }
}
