//! Account login, progress persistence, completion logging and the leaderboard.

use std::time::{Instant, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{AccountEntity, CompletionEntity, LeaderboardEntryEntity, ProgressSnapshot},
    dto::validation::MIN_USERNAME_CHARS,
    error::ServiceError,
    state::SharedState,
};

/// Rows returned when the client does not ask for a specific count.
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;
/// Upper bound of the leaderboard size.
pub const MAX_LEADERBOARD_LIMIT: u32 = 100;

/// Result of a login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: AccountEntity,
    pub progress: ProgressSnapshot,
    pub is_new_user: bool,
}

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Absorbed by the per-account throttle; nothing was written.
    Throttled,
}

/// One task submission to record.
#[derive(Debug, Clone)]
pub struct CompletionCommand {
    pub account_id: Uuid,
    pub task_id: String,
    pub task_type: String,
    pub content: String,
    pub feedback: String,
    pub passed: bool,
}

/// Log in by name, registering the account on first use.
pub async fn login(state: &SharedState, username: &str) -> Result<LoginOutcome, ServiceError> {
    let username = username.trim();
    if username.chars().count() < MIN_USERNAME_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "username must be at least {MIN_USERNAME_CHARS} characters long"
        )));
    }

    let store = state.require_progress_store().await?;

    if let Some(account) = store.find_account_by_name(username.to_owned()).await? {
        let progress = load_snapshot(state, account.id).await?;
        return Ok(LoginOutcome {
            account,
            progress,
            is_new_user: false,
        });
    }

    match store.create_account(username.to_owned()).await {
        Ok(account) => {
            info!(account_id = %account.id, username = %account.username, "account created");
            Ok(LoginOutcome {
                account,
                progress: ProgressSnapshot::default(),
                is_new_user: true,
            })
        }
        Err(err) => match ServiceError::from(err) {
            // Lost a registration race: the other request created the account.
            ServiceError::Conflict(_) => {
                let account = store
                    .find_account_by_name(username.to_owned())
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("account `{username}`")))?;
                let progress = load_snapshot(state, account.id).await?;
                Ok(LoginOutcome {
                    account,
                    progress,
                    is_new_user: false,
                })
            }
            other => Err(other),
        },
    }
}

async fn load_snapshot(
    state: &SharedState,
    account_id: Uuid,
) -> Result<ProgressSnapshot, ServiceError> {
    let Some(store) = state.progress_store().await else {
        return Ok(ProgressSnapshot::default());
    };
    Ok(store
        .get_progress(account_id)
        .await?
        .map(|entity| entity.snapshot)
        .unwrap_or_default())
}

/// Stored progress of an account; the default snapshot when none exists or storage is degraded.
pub async fn get_progress(
    state: &SharedState,
    account_id: Uuid,
) -> Result<ProgressSnapshot, ServiceError> {
    if state.is_degraded() {
        warn!(account_id = %account_id, "serving default progress (degraded mode)");
    }
    load_snapshot(state, account_id).await
}

/// Replace the stored progress unless a non-forced save of the same account was accepted
/// less than the throttle interval ago.
pub async fn save_progress(
    state: &SharedState,
    account_id: Uuid,
    snapshot: ProgressSnapshot,
    force: bool,
) -> Result<SaveOutcome, ServiceError> {
    let store = state.require_progress_store().await?;

    if !state.save_throttle().admit(account_id, force, Instant::now()) {
        debug!(account_id = %account_id, "save throttled");
        return Ok(SaveOutcome::Throttled);
    }

    store
        .upsert_progress(account_id, snapshot)
        .await
        .inspect_err(|err| warn!(account_id = %account_id, error = %err, "failed to save progress"))?;
    Ok(SaveOutcome::Saved)
}

/// Append the completion record, then add the task to the completed set when it passed.
pub async fn complete_task(
    state: &SharedState,
    command: CompletionCommand,
) -> Result<(), ServiceError> {
    let store = state.require_progress_store().await?;
    let CompletionCommand {
        account_id,
        task_id,
        task_type,
        content,
        feedback,
        passed,
    } = command;

    store
        .append_completion(CompletionEntity {
            id: Uuid::new_v4(),
            account_id,
            task_id: task_id.clone(),
            task_type,
            submitted_content: content,
            feedback,
            passed,
            created_at: SystemTime::now(),
        })
        .await?;

    if passed {
        store.add_completed_task(account_id, task_id.clone()).await?;
    }
    info!(account_id = %account_id, task_id = %task_id, passed, "task submission recorded");
    Ok(())
}

/// Clamp a requested leaderboard size into the served range.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT)
}

/// Best scores, served from a short-lived cache.
pub async fn leaderboard(
    state: &SharedState,
    limit: Option<u32>,
) -> Result<Vec<LeaderboardEntryEntity>, ServiceError> {
    let limit = clamp_limit(limit);
    let now = Instant::now();

    if let Some(cached) = state.leaderboard_cache().get(limit, now) {
        debug!(limit, "leaderboard cache hit");
        return Ok(cached);
    }

    let Some(store) = state.progress_store().await else {
        warn!("leaderboard unavailable (degraded mode)");
        return Ok(Vec::new());
    };

    let entries = store.top_scores(limit).await?;
    state.leaderboard_cache().put(limit, entries.clone(), now);
    Ok(entries)
}

/// Administrative reset of an account's progress back to the defaults.
pub async fn reset_progress(state: &SharedState, account_id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_progress_store().await?;
    store.reset_progress(account_id).await?;
    warn!(account_id = %account_id, "progress reset");
    Ok(())
}
