//! Level progression: auto-advance once the active level is cleared, and
//! navigation between unlocked levels, as a plan/apply state machine.

use std::time::Instant;

use indexmap::IndexSet;
use thiserror::Error;
use uuid::Uuid;

use crate::state::levels::LevelCatalog;

/// High-level phases of a player's run through the level catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionPhase {
    /// Playing the level at the given index.
    Playing {
        /// Index of the active level.
        level_index: usize,
    },
    /// Every level is cleared; auto-advance is over for good.
    AllCompleted {
        /// Index of the level the player is standing in.
        level_index: usize,
    },
}

impl ProgressionPhase {
    /// Index of the active level regardless of phase.
    pub fn level_index(&self) -> usize {
        match self {
            ProgressionPhase::Playing { level_index }
            | ProgressionPhase::AllCompleted { level_index } => *level_index,
        }
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionEvent {
    /// Every required task of the active level is completed.
    LevelCleared,
    /// The player picks an unlocked level from the level list.
    SelectLevel(usize),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: ProgressionPhase,
    /// The event that cannot be applied from this phase.
    pub event: ProgressionEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A level transition is already pending and must be applied or aborted.
    #[error("a level transition is already pending")]
    AlreadyPending,
    /// The requested level is not unlocked yet.
    #[error("level {0} is locked")]
    Locked(usize),
    /// The requested transition is not valid from the current phase.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    #[error("phase changed during transition (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        /// Phase when plan was created.
        expected: ProgressionPhase,
        /// Current phase.
        actual: ProgressionPhase,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: ProgressionPhase,
    /// Phase the state machine will transition to.
    pub to: ProgressionPhase,
    /// Event that triggered this transition.
    pub event: ProgressionEvent,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Result of a completion check on the active level.
#[derive(Debug, Clone)]
pub enum CompletionCheck {
    /// Some required task is still missing.
    NotComplete,
    /// The level is cleared and a next level exists; apply the plan once the notice is shown.
    Advance(Plan),
    /// The last level is cleared (or already was).
    AllCompleted,
}

/// Tracks the active level and derives level transitions from the completed-task set.
#[derive(Debug, Clone)]
pub struct LevelStateMachine {
    phase: ProgressionPhase,
    pending: Option<Plan>,
}

impl Default for LevelStateMachine {
    fn default() -> Self {
        Self {
            phase: ProgressionPhase::Playing { level_index: 0 },
            pending: None,
        }
    }
}

impl LevelStateMachine {
    /// Create a state machine positioned on the first level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a machine from a stored level index.
    ///
    /// The index is clamped to the highest level the completed set unlocks, so a
    /// stale or tampered snapshot can never skip prerequisites.
    pub fn restore(
        stored_index: usize,
        catalog: &LevelCatalog,
        completed: &IndexSet<String>,
    ) -> Self {
        let level_index = stored_index.min(catalog.highest_unlocked(completed));
        Self {
            phase: ProgressionPhase::Playing { level_index },
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> ProgressionPhase {
        self.phase
    }

    /// Index of the active level.
    pub fn level_index(&self) -> usize {
        self.phase.level_index()
    }

    /// Whether a transition waits to be applied.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Decide whether the active level is cleared and, if so, what happens next.
    pub fn check_completion(
        &mut self,
        catalog: &LevelCatalog,
        completed: &IndexSet<String>,
    ) -> Result<CompletionCheck, PlanError> {
        let level_index = match self.phase {
            ProgressionPhase::AllCompleted { .. } => return Ok(CompletionCheck::AllCompleted),
            ProgressionPhase::Playing { level_index } => level_index,
        };

        if !catalog.is_level_completed(level_index, completed) {
            return Ok(CompletionCheck::NotComplete);
        }

        if level_index + 1 >= catalog.len() {
            self.phase = ProgressionPhase::AllCompleted { level_index };
            return Ok(CompletionCheck::AllCompleted);
        }

        let plan = self.plan(ProgressionEvent::LevelCleared, catalog, completed)?;
        Ok(CompletionCheck::Advance(plan))
    }

    /// Navigate to an unlocked level, returning the plan to apply.
    ///
    /// A pending auto-advance is dropped in favour of the explicit choice.
    pub fn select_level(
        &mut self,
        index: usize,
        catalog: &LevelCatalog,
        completed: &IndexSet<String>,
    ) -> Result<Plan, PlanError> {
        if !catalog.is_unlocked(index, completed) {
            return Err(PlanError::Locked(index));
        }
        self.pending = None;
        self.plan(ProgressionEvent::SelectLevel(index), catalog, completed)
    }

    /// Validate an event against the current phase and stash it as the pending plan.
    pub fn plan(
        &mut self,
        event: ProgressionEvent,
        catalog: &LevelCatalog,
        completed: &IndexSet<String>,
    ) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event, catalog, completed)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition and return the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<ProgressionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        self.phase = plan.to;
        Ok(self.phase)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(
        &self,
        event: ProgressionEvent,
        catalog: &LevelCatalog,
        completed: &IndexSet<String>,
    ) -> Result<ProgressionPhase, InvalidTransition> {
        let invalid = || InvalidTransition {
            from: self.phase,
            event,
        };

        let next = match (self.phase, event) {
            (ProgressionPhase::Playing { level_index }, ProgressionEvent::LevelCleared)
                if level_index + 1 < catalog.len()
                    && catalog.is_level_completed(level_index, completed) =>
            {
                ProgressionPhase::Playing {
                    level_index: level_index + 1,
                }
            }
            (ProgressionPhase::Playing { .. }, ProgressionEvent::SelectLevel(index)) => {
                ProgressionPhase::Playing { level_index: index }
            }
            (ProgressionPhase::AllCompleted { .. }, ProgressionEvent::SelectLevel(index)) => {
                ProgressionPhase::AllCompleted { level_index: index }
            }
            _ => return Err(invalid()),
        };

        Ok(next)
    }
}
