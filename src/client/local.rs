//! In-process backend calling the service layer directly.

use futures::future::BoxFuture;
use uuid::Uuid;

use super::{ClientError, ClientResult, CompletionReport, GameBackend, LoginResult};
use crate::{
    dao::models::ProgressSnapshot,
    dto::user::LeaderboardEntry,
    error::{AppError, ServiceError},
    services::{
        task_validator::Verdict,
        user_service::{self, CompletionCommand},
        validation_service,
    },
    state::{SharedState, levels::ValidatorTarget},
};

/// Runs a session against a [`SharedState`] without going through HTTP.
#[derive(Clone)]
pub struct LocalBackend {
    state: SharedState,
}

impl LocalBackend {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

/// Report service failures with the status the HTTP layer would answer.
fn rejected(endpoint: &str, err: ServiceError) -> ClientError {
    let err = AppError::from(err);
    ClientError::Status {
        endpoint: endpoint.to_owned(),
        status: err.status().as_u16(),
        message: err.to_string(),
    }
}

impl GameBackend for LocalBackend {
    fn login(&self, username: String) -> BoxFuture<'static, ClientResult<LoginResult>> {
        let state = self.state.clone();
        Box::pin(async move {
            let outcome = user_service::login(&state, &username)
                .await
                .map_err(|err| rejected("login", err))?;
            Ok(LoginResult {
                account_id: outcome.account.id,
                username: outcome.account.username,
                is_new_user: outcome.is_new_user,
                progress: outcome.progress,
            })
        })
    }

    fn save_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
        force: bool,
    ) -> BoxFuture<'static, ClientResult<()>> {
        let state = self.state.clone();
        Box::pin(async move {
            user_service::save_progress(&state, account_id, snapshot, force)
                .await
                .map_err(|err| rejected("save", err))?;
            Ok(())
        })
    }

    fn complete_task(&self, report: CompletionReport) -> BoxFuture<'static, ClientResult<()>> {
        let state = self.state.clone();
        Box::pin(async move {
            let command = CompletionCommand {
                account_id: report.account_id,
                task_id: report.task_id,
                task_type: report.task_type,
                content: report.content,
                feedback: report.feedback,
                passed: report.passed,
            };
            user_service::complete_task(&state, command)
                .await
                .map_err(|err| rejected("complete-npc", err))
        })
    }

    fn validate(
        &self,
        target: ValidatorTarget,
        content: String,
    ) -> BoxFuture<'static, ClientResult<Verdict>> {
        let state = self.state.clone();
        Box::pin(async move {
            validation_service::validate_submission(&state, target, content)
                .await
                .map_err(|err| rejected("validate", err))
        })
    }

    fn leaderboard(&self, limit: u32) -> BoxFuture<'static, ClientResult<Vec<LeaderboardEntry>>> {
        let state = self.state.clone();
        Box::pin(async move {
            let entries = user_service::leaderboard(&state, Some(limit))
                .await
                .map_err(|err| rejected("leaderboard", err))?;
            Ok(entries.into_iter().map(Into::into).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{
            AppState,
            tests::{CannedValidator, OfflineAssistant},
        },
    };

    #[tokio::test]
    async fn degraded_writes_surface_503() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
            Arc::new(OfflineAssistant),
        );
        let backend = LocalBackend::new(state);

        let err = backend
            .save_progress(Uuid::new_v4(), ProgressSnapshot::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503, .. }));
        assert!(backend.leaderboard(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_username_is_a_bad_request() {
        let (state, _store) = crate::state::tests::memory_state(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
        )
        .await;
        let err = LocalBackend::new(state)
            .login(" a ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 400, .. }));
    }
}
