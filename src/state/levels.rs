//! Static level catalog: maps, NPC/task descriptors, and the completion rules derived from them.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Map cell value that blocks movement.
pub const WALL_CELL: u8 = 9;

/// Integer grid coordinate on a level map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Build a position from its coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Position assigned to accounts that never saved any progress.
pub const DEFAULT_START_POSITION: Position = Position::new(7, 6);

impl Default for Position {
    fn default() -> Self {
        DEFAULT_START_POSITION
    }
}

/// How the score for a first-time pass is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "points", rename_all = "snake_case")]
pub enum RewardMode {
    /// Award the configured amount.
    Fixed(u32),
    /// Award whatever score the validator returns for the submission.
    AiAssigned,
}

/// How the validator answer is presented to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// A short pass/fail feedback line.
    #[default]
    Short,
    /// Long-form generated content shown in full.
    LongForm,
}

/// Which upstream agent validates a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", content = "id", rename_all = "snake_case")]
pub enum ValidatorTarget {
    /// Streaming workflow identified by its workflow id.
    Workflow(String),
    /// Chat bot identified by its bot id.
    Bot(String),
}

/// Gated task carried by a task NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-form task category (e.g. "prompt", "image"), logged with completions.
    pub task_type: String,
    /// Reward policy applied on the first pass.
    pub reward: RewardMode,
    /// Rendering mode for the validator answer.
    pub response: ResponseMode,
    /// Upstream agent that grades submissions.
    pub target: ValidatorTarget,
}

/// The two NPC families: the exempt helper and gated tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NpcKind {
    /// Opens the assistant chat; never gates completion and never rewards.
    Assistant,
    /// Task that must be passed to clear the level.
    Task(TaskSpec),
}

/// NPC placed on a level map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcDescriptor {
    /// Identifier stored in the completed set.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Tile the NPC stands on.
    pub position: Position,
    /// Assistant or gated task.
    pub kind: NpcKind,
}

impl NpcDescriptor {
    /// Task details, or `None` for the assistant.
    pub fn task(&self) -> Option<&TaskSpec> {
        match &self.kind {
            NpcKind::Task(spec) => Some(spec),
            NpcKind::Assistant => None,
        }
    }
}

/// One stage of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Stable level identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Tile rows; `map[y][x]`.
    pub map: Vec<Vec<u8>>,
    /// NPCs placed on the map.
    pub npcs: Vec<NpcDescriptor>,
    /// Where the avatar is placed when the level is entered.
    pub start_position: Position,
}

impl Level {
    /// Ids of every task that must be passed to clear this level.
    pub fn required_task_ids(&self) -> impl Iterator<Item = &str> {
        self.npcs
            .iter()
            .filter(|npc| npc.task().is_some())
            .map(|npc| npc.id.as_str())
    }

    /// Look up an NPC by id.
    pub fn npc(&self, id: &str) -> Option<&NpcDescriptor> {
        self.npcs.iter().find(|npc| npc.id == id)
    }

    /// Whether the avatar may stand on the given tile.
    pub fn is_walkable(&self, position: Position) -> bool {
        let (Ok(x), Ok(y)) = (usize::try_from(position.x), usize::try_from(position.y)) else {
            return false;
        };
        self.map
            .get(y)
            .and_then(|row| row.get(x))
            .is_some_and(|cell| *cell != WALL_CELL)
    }
}

/// Completion statistics for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LevelProgress {
    /// Required tasks already in the completed set.
    pub completed_count: usize,
    /// Number of required tasks.
    pub total_required: usize,
    /// Rounded percentage; 0 for a level without required tasks.
    pub percent: u32,
}

/// Ordered list of levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCatalog {
    levels: Vec<Level>,
}

impl LevelCatalog {
    /// Wrap an ordered list of levels.
    pub fn new(levels: Vec<Level>) -> Self {
        Self { levels }
    }

    /// Level at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no level is configured.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Iterate over levels in order.
    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    /// Progress of the level at `index`; an unknown index reports an empty level.
    pub fn level_progress(&self, index: usize, completed: &IndexSet<String>) -> LevelProgress {
        let Some(level) = self.get(index) else {
            return LevelProgress {
                completed_count: 0,
                total_required: 0,
                percent: 0,
            };
        };

        let mut total_required = 0;
        let mut completed_count = 0;
        for id in level.required_task_ids() {
            total_required += 1;
            if completed.contains(id) {
                completed_count += 1;
            }
        }

        let percent = if total_required == 0 {
            0
        } else {
            ((100 * completed_count) as f64 / total_required as f64).round() as u32
        };

        LevelProgress {
            completed_count,
            total_required,
            percent,
        }
    }

    /// Whether every required task of the level is completed.
    ///
    /// A level without required tasks is trivially complete even though its
    /// [`LevelProgress::percent`] reads 0.
    pub fn is_level_completed(&self, index: usize, completed: &IndexSet<String>) -> bool {
        self.get(index).is_some_and(|level| {
            level
                .required_task_ids()
                .all(|id| completed.contains(id))
        })
    }

    /// Level `k` is navigable when it is the first one or its predecessor is complete.
    ///
    /// Unlocking follows [`Self::is_level_completed`] rather than a 100 percent
    /// reading, so a level after one without required tasks opens right away
    /// even though the empty predecessor shows 0 percent.
    pub fn is_unlocked(&self, index: usize, completed: &IndexSet<String>) -> bool {
        if index >= self.len() {
            return false;
        }
        index == 0 || self.is_level_completed(index - 1, completed)
    }

    /// Highest index reachable from level 0 given the completed set.
    pub fn highest_unlocked(&self, completed: &IndexSet<String>) -> usize {
        let mut index = 0;
        while index + 1 < self.len() && self.is_level_completed(index, completed) {
            index += 1;
        }
        index
    }

    /// Find the level and NPC carrying the given id.
    pub fn find_npc(&self, id: &str) -> Option<(usize, &NpcDescriptor)> {
        self.levels
            .iter()
            .enumerate()
            .find_map(|(index, level)| level.npc(id).map(|npc| (index, npc)))
    }
}
