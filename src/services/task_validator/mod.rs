//! Seams to the external agents that grade submissions and answer player questions.

mod coze;
mod error;
mod parse;

use futures::future::BoxFuture;

pub use coze::{CozeClient, CozeConfig};
pub use error::{ValidatorError, ValidatorResult};
pub use parse::{parse_assistant_stream, parse_bot_reply, parse_workflow_stream};

use crate::state::levels::ValidatorTarget;

/// Feedback returned whenever the validator could not be reached.
pub const UNAVAILABLE_FEEDBACK: &str =
    "The validation service is temporarily unavailable, please try again later.";
/// Feedback returned when the validator answered something unusable.
pub const MALFORMED_FEEDBACK: &str =
    "The validation service returned an unexpected response, please try again later.";

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the submission passes the task.
    pub passed: bool,
    /// Text shown to the player.
    pub feedback: String,
    /// Score assigned by the agent, if any.
    pub score: Option<f64>,
    /// Long-form generated content, if any.
    pub long_content: Option<String>,
}

impl Verdict {
    /// Safe failure used when the agent call fails for any reason.
    pub fn degraded(err: &ValidatorError) -> Self {
        let feedback = match err {
            ValidatorError::Malformed { .. } => MALFORMED_FEEDBACK,
            _ => UNAVAILABLE_FEEDBACK,
        };
        Self {
            passed: false,
            feedback: feedback.to_owned(),
            score: None,
            long_content: None,
        }
    }

    /// Safe failure used when the agent does not answer in time.
    pub fn timed_out() -> Self {
        Self::degraded(&ValidatorError::Timeout)
    }
}

/// Question sent to the assistant agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantQuestion {
    /// The player's question.
    pub message: String,
    /// Conversation to continue, if any.
    pub conversation_id: Option<String>,
    /// Caller identity forwarded to the agent.
    pub user_id: Option<String>,
}

/// Answer produced by the assistant agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    /// Concatenated answer text.
    pub answer: String,
    /// Conversation the answer belongs to.
    pub conversation_id: Option<String>,
}

/// Grades task submissions.
pub trait TaskValidator: Send + Sync {
    fn validate(
        &self,
        target: ValidatorTarget,
        content: String,
    ) -> BoxFuture<'static, ValidatorResult<Verdict>>;
}

/// Answers free-form questions from the in-game helper.
pub trait AssistantChat: Send + Sync {
    fn ask(&self, question: AssistantQuestion) -> BoxFuture<'static, ValidatorResult<AssistantReply>>;
}
