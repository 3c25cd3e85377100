//! In-game assistant chat.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    error::ServiceError,
    services::task_validator::{AssistantQuestion, AssistantReply},
    state::SharedState,
};

/// Longest time a question waits for its answer.
pub const ASSISTANT_TIMEOUT: Duration = Duration::from_secs(60);

/// Placeholder answer used whenever the assistant agent is unavailable.
pub fn fallback_answer(question: &str) -> String {
    format!(
        "Here is where the answer about \"{question}\" would appear.\n\n\
         The AI assistant is not reachable right now.\n\n\
         Hint: make sure COZE_API_KEY and COZE_BOT_ASSISTANT are configured."
    )
}

/// Ask the assistant; upstream failures fall back to [`fallback_answer`].
pub async fn ask(
    state: &SharedState,
    question: AssistantQuestion,
) -> Result<AssistantReply, ServiceError> {
    if question.message.trim().is_empty() {
        return Err(ServiceError::InvalidInput("message must not be empty".into()));
    }

    info!(
        conversation_id = ?question.conversation_id,
        message_len = question.message.len(),
        "assistant question"
    );
    let message = question.message.clone();
    let conversation_id = question.conversation_id.clone();

    let reply = match timeout(ASSISTANT_TIMEOUT, state.assistant().ask(question)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            warn!(error = %err, "assistant call failed; answering with fallback");
            AssistantReply {
                answer: fallback_answer(&message),
                conversation_id,
            }
        }
        Err(_) => {
            warn!(timeout_secs = ASSISTANT_TIMEOUT.as_secs(), "assistant call timed out");
            AssistantReply {
                answer: fallback_answer(&message),
                conversation_id,
            }
        }
    };
    Ok(reply)
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

    fn question(message: &str) -> AssistantQuestion {
        AssistantQuestion {
            message: message.into(),
            conversation_id: Some("conv-1".into()),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn unconfigured_assistant_falls_back() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
            Arc::new(OfflineAssistant),
        );
        let reply = ask(&state, question("What is a prompt?")).await.unwrap();
        assert!(reply.answer.contains("What is a prompt?"));
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(CannedValidator::passing(None)),
            Arc::new(OfflineAssistant),
        );
        assert!(matches!(
            ask(&state, question("   ")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
