//! A logged-in player: movement, inventory, task submissions and level progression.

use std::{sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    ClientError, ClientResult, CompletionReport, GameBackend,
    synchronizer::{DEFAULT_SAVE_DEBOUNCE, ProgressSynchronizer},
};
use crate::{
    config::AppConfig,
    dao::models::ProgressSnapshot,
    dto::user::LeaderboardEntry,
    services::task_validator::{UNAVAILABLE_FEEDBACK, Verdict},
    state::{
        levels::{LevelCatalog, LevelProgress, Position, ResponseMode},
        progression::{CompletionCheck, LevelStateMachine, ProgressionPhase},
        rewards::{DropPolicy, MISSING_SCORE_WARNING, compute_reward},
    },
};

/// Pause between the "level cleared" notice and the move to the next level.
pub const DEFAULT_TRANSITION_DELAY: Duration = Duration::from_millis(1_500);

/// Level change caused by a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEvent {
    /// The active level is not cleared yet.
    None,
    /// The level was cleared and the player now stands in `level_index`.
    Advanced { level_index: usize },
    /// The last level is cleared.
    AllCompleted,
}

/// What the player sees after submitting a task.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub passed: bool,
    /// Feedback, possibly suffixed with a missing-score warning.
    pub feedback: String,
    /// Text to render: the long-form content for long-form tasks, the feedback otherwise.
    pub display: String,
    /// True when this submission completed the task for the first time.
    pub first_pass: bool,
    pub points_awarded: u64,
    pub dropped_item: Option<String>,
    pub level: LevelEvent,
}

struct ActiveSession {
    username: String,
    sync: ProgressSynchronizer,
    levels: LevelStateMachine,
}

/// Client-side game session.
pub struct PlayerSession {
    backend: Arc<dyn GameBackend>,
    catalog: Arc<LevelCatalog>,
    drop_policy: DropPolicy,
    debounce: Duration,
    transition_delay: Duration,
    rng: StdRng,
    active: Option<ActiveSession>,
    leaderboard: Vec<LeaderboardEntry>,
}

impl PlayerSession {
    pub fn new(backend: Arc<dyn GameBackend>, config: &AppConfig) -> Self {
        Self {
            backend,
            catalog: config.catalog().clone(),
            drop_policy: config.drop_policy().clone(),
            debounce: DEFAULT_SAVE_DEBOUNCE,
            transition_delay: DEFAULT_TRANSITION_DELAY,
            rng: StdRng::from_os_rng(),
            active: None,
            leaderboard: Vec::new(),
        }
    }

    /// Override the save debounce and the level transition delay.
    pub fn with_timings(mut self, debounce: Duration, transition_delay: Duration) -> Self {
        self.debounce = debounce;
        self.transition_delay = transition_delay;
        self
    }

    /// Use a deterministic random source for prize drops.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Log in, ending the current session first if there is one.
    ///
    /// A stored level index beyond what the completed tasks unlock is pulled back.
    pub async fn login(&mut self, username: &str) -> ClientResult<bool> {
        if self.active.is_some() {
            self.logout().await?;
        }

        let login = self.backend.login(username.trim().to_owned()).await?;
        let mut progress = login.progress;
        let levels = LevelStateMachine::restore(
            progress.level_index as usize,
            &self.catalog,
            &progress.completed_tasks,
        );
        if levels.level_index() != progress.level_index as usize {
            warn!(
                account_id = %login.account_id,
                stored = progress.level_index,
                restored = levels.level_index(),
                "stored level is locked; falling back"
            );
            progress.level_index = levels.level_index() as u32;
        }

        info!(account_id = %login.account_id, is_new_user = login.is_new_user, "player logged in");
        self.active = Some(ActiveSession {
            username: login.username,
            sync: ProgressSynchronizer::with_debounce(
                self.backend.clone(),
                login.account_id,
                progress,
                self.debounce,
            ),
            levels,
        });
        Ok(login.is_new_user)
    }

    /// Forced save, then drop the local session.
    pub async fn logout(&mut self) -> ClientResult<()> {
        let active = self.active.take().ok_or(ClientError::NotLoggedIn)?;
        let account_id = active.sync.account_id();
        let saved = active.sync.shutdown().await;
        info!(account_id = %account_id, saved, "player logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.is_some()
    }

    pub fn account_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.sync.account_id())
    }

    pub fn username(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.username.as_str())
    }

    /// Copy of the local game state.
    pub fn snapshot(&self) -> ClientResult<ProgressSnapshot> {
        Ok(self.active()?.sync.snapshot())
    }

    pub fn phase(&self) -> ClientResult<ProgressionPhase> {
        Ok(self.active()?.levels.phase())
    }

    /// Step onto a tile of the active level.
    pub fn move_to(&mut self, position: Position) -> ClientResult<()> {
        let active = self.active()?;
        let walkable = self
            .catalog
            .get(active.levels.level_index())
            .is_some_and(|level| level.is_walkable(position));
        if !walkable {
            return Err(ClientError::Rejected(format!(
                "tile ({}, {}) is not walkable",
                position.x, position.y
            )));
        }
        active.sync.mutate(|state| state.position = position);
        active.sync.schedule_save();
        Ok(())
    }

    /// Add an item; returns false when it was already owned.
    pub fn add_inventory(&mut self, item: &str) -> ClientResult<bool> {
        let active = self.active()?;
        let added = active
            .sync
            .mutate(|state| state.inventory.insert(item.to_owned()));
        if added {
            active.sync.schedule_save();
        }
        Ok(added)
    }

    pub fn set_avatar(&mut self, avatar: Option<String>) -> ClientResult<()> {
        let active = self.active()?;
        active.sync.mutate(|state| state.avatar = avatar);
        active.sync.schedule_save();
        Ok(())
    }

    /// Completion statistics of a level for the local completed set.
    pub fn level_progress(&self, index: usize) -> ClientResult<LevelProgress> {
        let active = self.active()?;
        Ok(active
            .sync
            .read(|state| self.catalog.level_progress(index, &state.completed_tasks)))
    }

    /// Navigate to an unlocked level; the completed set is left untouched.
    pub async fn select_level(&mut self, index: usize) -> ClientResult<()> {
        let catalog = self.catalog.clone();
        let active = self.active.as_mut().ok_or(ClientError::NotLoggedIn)?;
        let completed = active.sync.read(|state| state.completed_tasks.clone());

        let plan = active
            .levels
            .select_level(index, &catalog, &completed)
            .map_err(|_| ClientError::LevelLocked(index))?;
        if let Err(err) = active.levels.apply(plan.id) {
            warn!(error = %err, "level selection could not be applied");
            return Err(ClientError::LevelLocked(index));
        }

        enter_level(active, &catalog, index).await;
        Ok(())
    }

    /// Grade a submission, record it, reward a first pass and advance the level when cleared.
    ///
    /// When the submission clears a level that has a successor, the returned future
    /// resolves only after the transition delay, once the player stands in the next level.
    pub async fn submit_task(
        &mut self,
        task_id: &str,
        content: &str,
    ) -> ClientResult<SubmissionOutcome> {
        let catalog = self.catalog.clone();
        let active = self.active.as_mut().ok_or(ClientError::NotLoggedIn)?;

        let (level_index, npc) = catalog
            .find_npc(task_id)
            .ok_or_else(|| ClientError::UnknownTask(task_id.to_owned()))?;
        let task = npc
            .task()
            .ok_or_else(|| ClientError::NotATask(task_id.to_owned()))?;
        let unlocked = active
            .sync
            .read(|state| catalog.is_unlocked(level_index, &state.completed_tasks));
        if !unlocked {
            return Err(ClientError::LevelLocked(level_index));
        }

        let account_id = active.sync.account_id();
        let verdict = match self
            .backend
            .validate(task.target.clone(), content.to_owned())
            .await
        {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(account_id = %account_id, task_id, error = %err, "validation request failed");
                Verdict {
                    passed: false,
                    feedback: UNAVAILABLE_FEEDBACK.to_owned(),
                    score: None,
                    long_content: None,
                }
            }
        };

        let first_pass = verdict.passed
            && !active
                .sync
                .read(|state| state.completed_tasks.contains(task_id));

        let mut feedback = verdict.feedback.clone();
        let mut points_awarded = 0;
        let mut dropped_item = None;
        if first_pass {
            let reward = compute_reward(task.reward, verdict.score);
            if reward.missing_score {
                feedback = format!("{feedback} {MISSING_SCORE_WARNING}");
            }
            points_awarded = reward.points;
            let prize = self.drop_policy.roll(&mut self.rng);

            dropped_item = active.sync.mutate(|state| {
                state.completed_tasks.insert(task_id.to_owned());
                state.score = state.score.saturating_add(reward.points);
                prize.filter(|item| state.inventory.insert(item.clone()))
            });
        }

        let report = CompletionReport {
            account_id,
            task_id: task_id.to_owned(),
            task_type: task.task_type.clone(),
            content: content.to_owned(),
            feedback: feedback.clone(),
            passed: verdict.passed,
        };
        if let Err(err) = self.backend.complete_task(report).await {
            warn!(account_id = %account_id, task_id, error = %err, "completion record not stored");
        }

        let display = match (task.response, &verdict.long_content) {
            (ResponseMode::LongForm, Some(long)) => long.clone(),
            _ => feedback.clone(),
        };

        let mut level = LevelEvent::None;
        if first_pass {
            active.sync.save_now(true).await;
            level = advance_if_cleared(active, &catalog, self.transition_delay).await;
        }

        Ok(SubmissionOutcome {
            passed: verdict.passed,
            feedback,
            display,
            first_pass,
            points_awarded,
            dropped_item,
            level,
        })
    }

    /// Fetch the leaderboard and keep it for display.
    pub async fn refresh_leaderboard(&mut self, limit: u32) -> ClientResult<&[LeaderboardEntry]> {
        self.leaderboard = self.backend.leaderboard(limit).await?;
        Ok(&self.leaderboard)
    }

    /// Last fetched leaderboard.
    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    fn active(&self) -> ClientResult<&ActiveSession> {
        self.active.as_ref().ok_or(ClientError::NotLoggedIn)
    }
}

async fn advance_if_cleared(
    active: &mut ActiveSession,
    catalog: &LevelCatalog,
    transition_delay: Duration,
) -> LevelEvent {
    let completed = active.sync.read(|state| state.completed_tasks.clone());
    let plan = match active.levels.check_completion(catalog, &completed) {
        Ok(CompletionCheck::NotComplete) => return LevelEvent::None,
        Ok(CompletionCheck::AllCompleted) => {
            info!(account_id = %active.sync.account_id(), "all levels completed");
            return LevelEvent::AllCompleted;
        }
        Ok(CompletionCheck::Advance(plan)) => plan,
        Err(err) => {
            warn!(error = %err, "level completion check failed");
            return LevelEvent::None;
        }
    };

    sleep(transition_delay).await;

    match active.levels.apply(plan.id) {
        Ok(phase) => {
            let level_index = phase.level_index();
            enter_level(active, catalog, level_index).await;
            info!(account_id = %active.sync.account_id(), level_index, "level advanced");
            LevelEvent::Advanced { level_index }
        }
        Err(err) => {
            warn!(error = %err, "level advance dropped");
            LevelEvent::None
        }
    }
}

/// Move the avatar to the level start and persist the level change immediately.
async fn enter_level(active: &mut ActiveSession, catalog: &LevelCatalog, index: usize) {
    let start = catalog
        .get(index)
        .map(|level| level.start_position)
        .unwrap_or_default();
    active.sync.mutate(|state| {
        state.level_index = index as u32;
        state.position = start;
    });
    active.sync.save_now(true).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{LocalBackend, tests::RecordingBackend},
        state::{
            levels::tests::sample_catalog,
            rewards::MAX_AI_REWARD,
            tests::{CannedValidator, memory_state},
        },
    };

    fn config(drop_rate: f64) -> AppConfig {
        AppConfig::new(
            sample_catalog(),
            DropPolicy {
                drop_rate,
                prize_pool: vec!["golden key".into()],
            },
        )
    }

    fn session(backend: Arc<dyn GameBackend>, drop_rate: f64) -> PlayerSession {
        PlayerSession::new(backend, &config(drop_rate)).with_rng(StdRng::seed_from_u64(7))
    }

    fn passing(score: Option<f64>) -> Verdict {
        Verdict {
            passed: true,
            feedback: "well done".into(),
            score,
            long_content: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_pass_awards_fixed_reward_once() {
        let (state, store) = memory_state(
            config(0.0),
            Arc::new(CannedValidator::passing(None)),
        )
        .await;
        let mut session = session(Arc::new(LocalBackend::new(state)), 0.0);
        assert!(session.login("Ada").await.unwrap());
        let account_id = session.account_id().unwrap();

        let outcome = session.submit_task("t1", "my prompt").await.unwrap();
        assert!(outcome.first_pass);
        assert_eq!(outcome.points_awarded, 100);
        assert_eq!(outcome.level, LevelEvent::None);
        assert_eq!(session.snapshot().unwrap().score, 100);

        let again = session.submit_task("t1", "my prompt").await.unwrap();
        assert!(again.passed);
        assert!(!again.first_pass);
        assert_eq!(again.points_awarded, 0);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.score, 100);
        assert_eq!(snapshot.completed_tasks.len(), 1);

        let completions = store.completions_for(account_id).await;
        assert_eq!(completions.len(), 2);
        assert!(completions.iter().all(|record| record.passed));
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_a_level_moves_to_the_next_start() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let mut session = session(Arc::new(backend.clone()), 0.0);
        session.login("Ada").await.unwrap();

        let first = session.submit_task("t1", "a").await.unwrap();
        assert_eq!(first.level, LevelEvent::None);
        assert_eq!(session.snapshot().unwrap().level_index, 0);
        assert_eq!(session.level_progress(0).unwrap().percent, 50);

        let second = session.submit_task("t2", "b").await.unwrap();
        assert_eq!(second.level, LevelEvent::Advanced { level_index: 1 });

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.level_index, 1);
        assert_eq!(snapshot.position, Position::new(2, 1));

        let last = backend.saves().pop().unwrap();
        assert!(last.force);
        assert_eq!(last.snapshot.level_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ai_scored_task_without_score_warns() {
        let backend = RecordingBackend::new(Duration::ZERO).with_stored(ProgressSnapshot {
            completed_tasks: ["t1", "t2"].into_iter().map(str::to_owned).collect(),
            level_index: 1,
            ..ProgressSnapshot::default()
        });
        backend.set_verdict(passing(None));
        let mut session = session(Arc::new(backend.clone()), 0.0);
        session.login("Ada").await.unwrap();

        let outcome = session.submit_task("t3", "essay").await.unwrap();
        assert!(outcome.first_pass);
        assert_eq!(outcome.points_awarded, 0);
        assert!(outcome.feedback.ends_with(MISSING_SCORE_WARNING));
        assert_eq!(outcome.level, LevelEvent::Advanced { level_index: 2 });
        assert_eq!(backend.completions()[0].feedback, outcome.feedback);
    }

    #[tokio::test(start_paused = true)]
    async fn ai_score_takes_precedence() {
        let backend = RecordingBackend::new(Duration::ZERO).with_stored(ProgressSnapshot {
            completed_tasks: ["t1", "t2"].into_iter().map(str::to_owned).collect(),
            level_index: 1,
            ..ProgressSnapshot::default()
        });
        backend.set_verdict(passing(Some(42.9)));
        let mut session = session(Arc::new(backend), 0.0);
        session.login("Ada").await.unwrap();

        let outcome = session.submit_task("t3", "essay").await.unwrap();
        assert_eq!(outcome.points_awarded, 42);
        assert_eq!(session.snapshot().unwrap().score, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ai_score_is_capped_and_added_without_overflow() {
        let backend = RecordingBackend::new(Duration::ZERO).with_stored(ProgressSnapshot {
            score: 100,
            completed_tasks: ["t1", "t2"].into_iter().map(str::to_owned).collect(),
            level_index: 1,
            ..ProgressSnapshot::default()
        });
        backend.set_verdict(passing(Some(1e30)));
        let mut session = session(Arc::new(backend.clone()), 0.0);
        session.login("Ada").await.unwrap();

        let outcome = session.submit_task("t3", "essay").await.unwrap();
        assert_eq!(outcome.points_awarded, MAX_AI_REWARD);
        assert_eq!(session.snapshot().unwrap().score, 100 + MAX_AI_REWARD);
        assert_eq!(
            backend.saves().last().unwrap().snapshot.score,
            100 + MAX_AI_REWARD
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_changes_nothing_but_the_log() {
        let backend = RecordingBackend::new(Duration::ZERO);
        backend.set_verdict(Verdict {
            passed: false,
            feedback: "try again".into(),
            score: Some(90.0),
            long_content: None,
        });
        let mut session = session(Arc::new(backend.clone()), 1.0);
        session.login("Ada").await.unwrap();

        let outcome = session.submit_task("t1", "x").await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.dropped_item, None);
        assert_eq!(session.snapshot().unwrap(), ProgressSnapshot::default());
        assert!(backend.saves().is_empty());
        assert_eq!(backend.completions().len(), 1);
        assert!(!backend.completions()[0].passed);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_is_granted_once_and_deduplicated() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let mut session = session(Arc::new(backend), 1.0);
        session.login("Ada").await.unwrap();

        let first = session.submit_task("t1", "a").await.unwrap();
        assert_eq!(first.dropped_item.as_deref(), Some("golden key"));

        let second = session.submit_task("t2", "b").await.unwrap();
        assert_eq!(second.dropped_item, None);
        assert_eq!(session.snapshot().unwrap().inventory.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_levels_cannot_be_selected_or_played() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let mut session = session(Arc::new(backend), 0.0);
        session.login("Ada").await.unwrap();

        assert!(matches!(
            session.select_level(1).await,
            Err(ClientError::LevelLocked(1))
        ));
        assert!(matches!(
            session.submit_task("t3", "x").await,
            Err(ClientError::LevelLocked(1))
        ));
        assert!(matches!(
            session.submit_task("helper", "x").await,
            Err(ClientError::NotATask(_))
        ));
        assert!(matches!(
            session.submit_task("nope", "x").await,
            Err(ClientError::UnknownTask(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn login_clamps_a_locked_stored_level() {
        let backend = RecordingBackend::new(Duration::ZERO).with_stored(ProgressSnapshot {
            completed_tasks: ["t1"].into_iter().map(str::to_owned).collect(),
            level_index: 2,
            ..ProgressSnapshot::default()
        });
        let mut session = session(Arc::new(backend), 0.0);
        session.login("Ada").await.unwrap();
        assert_eq!(session.snapshot().unwrap().level_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn moving_is_debounced_and_walls_block() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let mut session = session(Arc::new(backend.clone()), 0.0);
        session.login("Ada").await.unwrap();

        session.move_to(Position::new(1, 1)).unwrap();
        session.move_to(Position::new(2, 1)).unwrap();
        assert!(matches!(
            session.move_to(Position::new(3, 0)),
            Err(ClientError::Rejected(_))
        ));
        assert!(session.add_inventory("lamp").unwrap());
        assert!(!session.add_inventory("lamp").unwrap());

        sleep(DEFAULT_SAVE_DEBOUNCE + Duration::from_millis(10)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].snapshot.position, Position::new(2, 1));
        assert!(saves[0].snapshot.inventory.contains("lamp"));
    }

    #[tokio::test(start_paused = true)]
    async fn logout_forces_a_save_and_ends_the_session() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let mut session = session(Arc::new(backend.clone()), 0.0);
        session.login("Ada").await.unwrap();
        session.set_avatar(Some("fox".into())).unwrap();

        session.logout().await.unwrap();
        assert!(!session.is_logged_in());
        assert!(matches!(session.snapshot(), Err(ClientError::NotLoggedIn)));

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert!(saves[0].force);
        assert_eq!(saves[0].snapshot.avatar.as_deref(), Some("fox"));
    }
}
