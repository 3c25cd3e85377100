//! Backend talking to the REST API over HTTP.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use super::{ClientError, ClientResult, CompletionReport, GameBackend, LoginResult};
use crate::{
    dao::models::ProgressSnapshot,
    dto::{
        user::{
            CompleteNpcRequest, LeaderboardEntry, LoginRequest, LoginResponse,
            SaveProgressRequest, SaveProgressResponse, SuccessResponse,
        },
        validate::{NpcConfigDto, ValidateRequest, ValidateResponse},
    },
    services::task_validator::Verdict,
    state::levels::ValidatorTarget,
};

/// Upper bound for any call; grading may take up to the server-side validator timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

/// [`GameBackend`] over the `/api` routes.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ClientError::Transport {
                endpoint: base_url.clone(),
                source,
            })?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(client: Client, url: String, body: B) -> ClientResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: url.clone(),
                source,
            })?;
        decode(url, response).await
    }
}

/// Decode a success body, or turn an error body `{success:false, error}` into [`ClientError::Status`].
async fn decode<T: DeserializeOwned>(url: String, response: Response) -> ClientResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            endpoint: url,
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| ClientError::Transport {
            endpoint: url,
            source,
        })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

fn npc_config(target: ValidatorTarget) -> NpcConfigDto {
    match target {
        ValidatorTarget::Workflow(id) => NpcConfigDto {
            workflow_id: Some(id),
            ..NpcConfigDto::default()
        },
        ValidatorTarget::Bot(id) => NpcConfigDto {
            bot_id: Some(id),
            ..NpcConfigDto::default()
        },
    }
}

impl GameBackend for HttpBackend {
    fn login(&self, username: String) -> BoxFuture<'static, ClientResult<LoginResult>> {
        let client = self.client.clone();
        let url = self.url("/api/user/login");
        Box::pin(async move {
            let response: LoginResponse =
                Self::post(client, url, LoginRequest { username }).await?;
            Ok(LoginResult {
                account_id: response.user.id,
                username: response.user.username,
                is_new_user: response.is_new_user,
                progress: response.user.progress.into(),
            })
        })
    }

    fn save_progress(
        &self,
        account_id: Uuid,
        snapshot: ProgressSnapshot,
        force: bool,
    ) -> BoxFuture<'static, ClientResult<()>> {
        let client = self.client.clone();
        let url = self.url("/api/user/save");
        Box::pin(async move {
            let request = SaveProgressRequest {
                user_id: account_id,
                data: snapshot.into(),
                force_save: force,
            };
            let _: SaveProgressResponse = Self::post(client, url, request).await?;
            Ok(())
        })
    }

    fn complete_task(&self, report: CompletionReport) -> BoxFuture<'static, ClientResult<()>> {
        let client = self.client.clone();
        let url = self.url("/api/user/complete-npc");
        Box::pin(async move {
            let request = CompleteNpcRequest {
                user_id: report.account_id,
                npc_id: report.task_id,
                npc_type: report.task_type,
                content: report.content,
                feedback: report.feedback,
                passed: report.passed,
            };
            let _: SuccessResponse = Self::post(client, url, request).await?;
            Ok(())
        })
    }

    fn validate(
        &self,
        target: ValidatorTarget,
        content: String,
    ) -> BoxFuture<'static, ClientResult<Verdict>> {
        let client = self.client.clone();
        let url = self.url("/api/validate");
        Box::pin(async move {
            let request = ValidateRequest {
                npc_config: npc_config(target),
                content,
            };
            let response: ValidateResponse = Self::post(client, url, request).await?;
            Ok(response.into())
        })
    }

    fn leaderboard(&self, limit: u32) -> BoxFuture<'static, ClientResult<Vec<LeaderboardEntry>>> {
        let client = self.client.clone();
        let url = self.url(&format!("/api/user/leaderboard/top?limit={limit}"));
        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|source| ClientError::Transport {
                    endpoint: url.clone(),
                    source,
                })?;
            decode(url, response).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_message_is_extracted() {
        assert_eq!(
            error_message(r#"{"success":false,"error":"bad request: too short"}"#),
            "bad request: too short"
        );
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn workflow_target_maps_to_workflow_id() {
        let config = npc_config(ValidatorTarget::Workflow("wf-1".into()));
        assert_eq!(config.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(config.bot_id, None);

        let config = npc_config(ValidatorTarget::Bot("bot-1".into()));
        assert_eq!(config.bot_id.as_deref(), Some("bot-1"));
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let backend = HttpBackend::new("http://localhost:3000/").unwrap();
        assert_eq!(backend.url("/health"), "http://localhost:3000/health");
    }
}
