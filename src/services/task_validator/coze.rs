//! HTTP client for the Coze workflow, bot and chat APIs.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{
    AssistantChat, AssistantQuestion, AssistantReply, TaskValidator, Verdict,
    error::{ValidatorError, ValidatorResult},
    parse::{parse_assistant_stream, parse_bot_reply, parse_workflow_stream},
};
use crate::state::levels::ValidatorTarget;

const DEFAULT_API_BASE: &str = "https://api.coze.com/open_api/v2";
const DEFAULT_WORKFLOW_API_BASE: &str = "https://api.coze.cn/v1";
const DEFAULT_V3_API_BASE: &str = "https://api.coze.cn/v3";
const VALIDATION_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ASSISTANT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime configuration describing how to reach the Coze APIs.
#[derive(Debug, Clone)]
pub struct CozeConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub workflow_api_base: String,
    pub v3_api_base: String,
    pub assistant_bot_id: Option<String>,
}

impl Default for CozeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_owned(),
            workflow_api_base: DEFAULT_WORKFLOW_API_BASE.to_owned(),
            v3_api_base: DEFAULT_V3_API_BASE.to_owned(),
            assistant_bot_id: None,
        }
    }
}

impl CozeConfig {
    /// Build a configuration from the `COZE_*` environment variables.
    ///
    /// Missing credentials are not an error here; calls fail with
    /// [`ValidatorError::NotConfigured`] instead.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        let defaults = Self::default();
        Self {
            api_key: var("COZE_API_KEY"),
            api_base: var("COZE_API_BASE").unwrap_or(defaults.api_base),
            workflow_api_base: var("COZE_WORKFLOW_API_BASE")
                .unwrap_or(defaults.workflow_api_base),
            v3_api_base: var("COZE_V3_API_BASE").unwrap_or(defaults.v3_api_base),
            assistant_bot_id: var("COZE_BOT_ASSISTANT"),
        }
    }
}

#[derive(Clone)]
pub struct CozeClient {
    client: Client,
    config: Arc<CozeConfig>,
}

impl CozeClient {
    pub fn new(config: CozeConfig) -> ValidatorResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| ValidatorError::ClientBuilder { source })?;
        if config.api_key.is_none() {
            info!("COZE_API_KEY not set; task validation and assistant will degrade");
        }
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn api_key(&self) -> ValidatorResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or(ValidatorError::NotConfigured {
                what: "COZE_API_KEY",
            })
    }

    fn post(&self, url: &str, timeout: Duration) -> ValidatorResult<RequestBuilder> {
        let key = self.api_key()?;
        Ok(self.client.post(url).bearer_auth(key).timeout(timeout))
    }

    async fn send_for_text(&self, builder: RequestBuilder, endpoint: &str) -> ValidatorResult<String> {
        let response = builder
            .send()
            .await
            .map_err(|source| request_error(endpoint, source))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Status {
                endpoint: endpoint.to_owned(),
                status,
            });
        }
        response
            .text()
            .await
            .map_err(|source| request_error(endpoint, source))
    }

    async fn run_workflow(&self, workflow_id: String, input: String) -> ValidatorResult<Verdict> {
        let endpoint = format!("{}/workflow/stream_run", self.config.workflow_api_base);
        debug!(workflow_id = %workflow_id, "calling workflow");
        let builder = self
            .post(&endpoint, VALIDATION_REQUEST_TIMEOUT)?
            .json(&json!({
                "workflow_id": workflow_id,
                "parameters": {"input": input},
            }));
        let body = self.send_for_text(builder, &endpoint).await?;
        parse_workflow_stream(&body)
    }

    async fn ask_bot(&self, bot_id: String, query: String) -> ValidatorResult<Verdict> {
        let endpoint = format!("{}/chat", self.config.api_base);
        debug!(bot_id = %bot_id, "calling bot");
        let builder = self
            .post(&endpoint, VALIDATION_REQUEST_TIMEOUT)?
            .json(&json!({
                "bot_id": bot_id,
                "user": ephemeral_user(),
                "query": query,
                "stream": false,
            }));
        let body = self.send_for_text(builder, &endpoint).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|err| ValidatorError::Malformed {
                reason: format!("bot reply is not JSON: {err}"),
            })?;
        Ok(parse_bot_reply(&value))
    }

    async fn chat(&self, question: AssistantQuestion) -> ValidatorResult<AssistantReply> {
        let bot_id = self
            .config
            .assistant_bot_id
            .clone()
            .ok_or(ValidatorError::NotConfigured {
                what: "COZE_BOT_ASSISTANT",
            })?;
        let endpoint = format!("{}/chat", self.config.v3_api_base);

        let mut payload = json!({
            "bot_id": bot_id,
            "user_id": question.user_id.clone().unwrap_or_else(ephemeral_user),
            "stream": true,
            "additional_messages": [{
                "role": "user",
                "type": "question",
                "content_type": "text",
                "content": question.message,
            }],
            "parameters": {},
        });
        if let Some(conversation_id) = &question.conversation_id {
            payload["conversation_id"] = Value::String(conversation_id.clone());
        }

        let builder = self
            .post(&endpoint, ASSISTANT_REQUEST_TIMEOUT)?
            .json(&payload);
        let body = self.send_for_text(builder, &endpoint).await?;
        Ok(parse_assistant_stream(&body, question.conversation_id))
    }
}

fn request_error(endpoint: &str, source: reqwest::Error) -> ValidatorError {
    if source.is_timeout() {
        ValidatorError::Timeout
    } else {
        ValidatorError::Request {
            endpoint: endpoint.to_owned(),
            source,
        }
    }
}

/// Throwaway caller identity for anonymous agent calls.
fn ephemeral_user() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("user_{millis}")
}

impl TaskValidator for CozeClient {
    fn validate(
        &self,
        target: ValidatorTarget,
        content: String,
    ) -> BoxFuture<'static, ValidatorResult<Verdict>> {
        let client = self.clone();
        Box::pin(async move {
            match target {
                ValidatorTarget::Workflow(workflow_id) => {
                    client.run_workflow(workflow_id, content).await
                }
                ValidatorTarget::Bot(bot_id) => client.ask_bot(bot_id, content).await,
            }
        })
    }
}

impl AssistantChat for CozeClient {
    fn ask(&self, question: AssistantQuestion) -> BoxFuture<'static, ValidatorResult<AssistantReply>> {
        let client = self.clone();
        Box::pin(async move { client.chat(question).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let client = CozeClient::new(CozeConfig::default()).unwrap();
        let err = client
            .validate(ValidatorTarget::Workflow("wf".into()), "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::NotConfigured {
                what: "COZE_API_KEY"
            }
        ));
    }

    #[tokio::test]
    async fn missing_assistant_bot_is_not_configured() {
        let config = CozeConfig {
            api_key: Some("key".into()),
            ..CozeConfig::default()
        };
        let client = CozeClient::new(config).unwrap();
        let err = client
            .ask(AssistantQuestion {
                message: "hi".into(),
                conversation_id: None,
                user_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::NotConfigured {
                what: "COZE_BOT_ASSISTANT"
            }
        ));
    }
}
