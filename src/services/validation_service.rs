//! Grading of task submissions by the configured agent.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    error::ServiceError,
    services::task_validator::Verdict,
    state::{SharedState, levels::ValidatorTarget},
};

/// Longest time a submission waits for its verdict.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pick the agent for a submission; a workflow wins over a bot.
pub fn resolve_target(
    workflow_id: Option<String>,
    bot_id: Option<String>,
) -> Result<ValidatorTarget, ServiceError> {
    let non_empty = |id: Option<String>| id.filter(|value| !value.trim().is_empty());
    match (non_empty(workflow_id), non_empty(bot_id)) {
        (Some(workflow), _) => Ok(ValidatorTarget::Workflow(workflow)),
        (None, Some(bot)) => Ok(ValidatorTarget::Bot(bot)),
        (None, None) => Err(ServiceError::InvalidInput(
            "npcConfig needs a workflowId or a botId".into(),
        )),
    }
}

/// Grade `content`; any agent failure degrades into a failed verdict.
pub async fn validate_submission(
    state: &SharedState,
    target: ValidatorTarget,
    content: String,
) -> Result<Verdict, ServiceError> {
    if content.trim().is_empty() {
        return Err(ServiceError::InvalidInput("content must not be empty".into()));
    }

    info!(agent = ?target, content_len = content.len(), "validating submission");
    let verdict = match timeout(VALIDATION_TIMEOUT, state.validator().validate(target, content)).await
    {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => {
            warn!(error = %err, "validator call failed");
            Verdict::degraded(&err)
        }
        Err(_) => {
            warn!(timeout_secs = VALIDATION_TIMEOUT.as_secs(), "validator call timed out");
            Verdict::timed_out()
        }
    };
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        services::task_validator::{
            MALFORMED_FEEDBACK, TaskValidator, UNAVAILABLE_FEEDBACK, ValidatorError,
            ValidatorResult,
        },
        state::{
            AppState,
            tests::{CannedValidator, OfflineAssistant},
        },
    };

    struct StalledValidator;

    impl TaskValidator for StalledValidator {
        fn validate(
            &self,
            _target: ValidatorTarget,
            _content: String,
        ) -> BoxFuture<'static, ValidatorResult<Verdict>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(Verdict {
                    passed: true,
                    feedback: "too late".into(),
                    score: None,
                    long_content: None,
                })
            })
        }
    }

    fn state_with(validator: Arc<dyn TaskValidator>) -> SharedState {
        AppState::new(AppConfig::default(), validator, Arc::new(OfflineAssistant))
    }

    fn workflow() -> ValidatorTarget {
        ValidatorTarget::Workflow("wf".into())
    }

    #[test]
    fn workflow_wins_over_bot() {
        assert_eq!(
            resolve_target(Some("wf".into()), Some("bot".into())).unwrap(),
            ValidatorTarget::Workflow("wf".into())
        );
        assert_eq!(
            resolve_target(Some(" ".into()), Some("bot".into())).unwrap(),
            ValidatorTarget::Bot("bot".into())
        );
        assert!(matches!(
            resolve_target(None, None),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let state = state_with(Arc::new(CannedValidator::passing(None)));
        assert!(matches!(
            validate_submission(&state, workflow(), "  ".into()).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn verdict_is_forwarded() {
        let state = state_with(Arc::new(CannedValidator::passing(Some(42.0))));
        let verdict = validate_submission(&state, workflow(), "answer".into())
            .await
            .unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.score, Some(42.0));
    }

    #[tokio::test]
    async fn malformed_answer_degrades_to_failure() {
        let failing = CannedValidator(Err(ValidatorError::Malformed {
            reason: "garbage".into(),
        }));
        let state = state_with(Arc::new(failing));
        let verdict = validate_submission(&state, workflow(), "answer".into())
            .await
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.feedback, MALFORMED_FEEDBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_generic_failure() {
        let state = state_with(Arc::new(StalledValidator));
        let verdict = validate_submission(&state, workflow(), "answer".into())
            .await
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.feedback, UNAVAILABLE_FEEDBACK);
    }
}
