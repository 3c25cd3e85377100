//! Application-level configuration loading: the level catalog and the prize drop policy.

use std::{env, fs, io::ErrorKind, path::PathBuf, sync::Arc};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::{
    levels::{
        Level, LevelCatalog, NpcDescriptor, NpcKind, Position, ResponseMode, RewardMode, TaskSpec,
        ValidatorTarget,
    },
    rewards::{DEFAULT_DROP_RATE, DropPolicy, default_prize_pool},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/levels.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "EVOLUTION_TOWN_CONFIG_PATH";
/// Reward granted by a fixed-mode task that does not configure one.
const DEFAULT_REWARD: u32 = 100;
/// NPC type that opens the assistant chat instead of gating progress.
const ASSISTANT_TYPE: &str = "assistant";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalog: Arc<LevelCatalog>,
    drop_policy: DropPolicy,
}

/// Reasons a configuration file is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `dropRate` is not a probability.
    #[error("dropRate must be within [0, 1], got {0}")]
    DropRateOutOfRange(f64),
    /// A gated task has neither a workflow nor a bot configured.
    #[error("task `{npc}` needs a workflowId or a botId")]
    MissingValidator {
        /// Offending NPC id.
        npc: String,
    },
    /// `rewardMode` holds an unknown value.
    #[error("task `{npc}` has unknown rewardMode `{mode}`")]
    UnknownRewardMode {
        /// Offending NPC id.
        npc: String,
        /// Value found in the file.
        mode: String,
    },
    /// `responseMode` holds an unknown value.
    #[error("task `{npc}` has unknown responseMode `{mode}`")]
    UnknownResponseMode {
        /// Offending NPC id.
        npc: String,
        /// Value found in the file.
        mode: String,
    },
    /// Two NPCs share an id, which would merge their completion state.
    #[error("npc id `{0}` is used more than once")]
    DuplicateNpc(String),
    /// No level is configured.
    #[error("at least one level is required")]
    NoLevels,
}

impl AppConfig {
    /// Build a configuration from already validated parts.
    pub fn new(catalog: LevelCatalog, drop_policy: DropPolicy) -> Self {
        Self {
            catalog: Arc::new(catalog),
            drop_policy,
        }
    }

    /// Load the configuration from disk, falling back to the built-in catalog.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        levels = app_config.catalog.len(),
                        drop_rate = app_config.drop_policy.drop_rate,
                        "loaded level catalog from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to load config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_json(contents: &str) -> Result<Self, LoadError> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        Ok(Self::try_from(raw)?)
    }

    /// Ordered level catalog.
    pub fn catalog(&self) -> &Arc<LevelCatalog> {
        &self.catalog
    }

    /// Prize drop policy.
    pub fn drop_policy(&self) -> &DropPolicy {
        &self.drop_policy
    }
}

/// Either a syntax or a semantic problem with the configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document is not valid JSON for the expected shape.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document parsed but describes an unusable catalog.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(default_catalog(), DropPolicy::default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    drop_rate: Option<f64>,
    prize_pool: Option<Vec<String>>,
    levels: Vec<RawLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLevel {
    id: u32,
    name: String,
    #[serde(default)]
    start_position: Option<Position>,
    map: Vec<Vec<u8>>,
    #[serde(default)]
    npcs: Vec<RawNpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNpc {
    id: String,
    name: String,
    x: i32,
    y: i32,
    #[serde(rename = "type")]
    kind: String,
    workflow_id: Option<String>,
    bot_id: Option<String>,
    reward: Option<u32>,
    reward_mode: Option<String>,
    response_mode: Option<String>,
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        let drop_rate = value.drop_rate.unwrap_or(DEFAULT_DROP_RATE);
        if !(0.0..=1.0).contains(&drop_rate) {
            return Err(ConfigError::DropRateOutOfRange(drop_rate));
        }
        if value.levels.is_empty() {
            return Err(ConfigError::NoLevels);
        }

        let levels = value
            .levels
            .into_iter()
            .map(Level::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = std::collections::HashSet::new();
        for npc in levels.iter().flat_map(|level| level.npcs.iter()) {
            if !seen.insert(npc.id.as_str()) {
                return Err(ConfigError::DuplicateNpc(npc.id.clone()));
            }
        }

        let drop_policy = DropPolicy {
            drop_rate,
            prize_pool: value.prize_pool.unwrap_or_else(default_prize_pool),
        };
        Ok(Self::new(LevelCatalog::new(levels), drop_policy))
    }
}

impl TryFrom<RawLevel> for Level {
    type Error = ConfigError;

    fn try_from(value: RawLevel) -> Result<Self, Self::Error> {
        let npcs = value
            .npcs
            .into_iter()
            .map(NpcDescriptor::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: value.id,
            name: value.name,
            map: value.map,
            npcs,
            start_position: value.start_position.unwrap_or_default(),
        })
    }
}

impl TryFrom<RawNpc> for NpcDescriptor {
    type Error = ConfigError;

    fn try_from(value: RawNpc) -> Result<Self, Self::Error> {
        let position = Position::new(value.x, value.y);
        if value.kind == ASSISTANT_TYPE {
            return Ok(Self {
                id: value.id,
                name: value.name,
                position,
                kind: NpcKind::Assistant,
            });
        }

        // Workflow takes precedence when both are configured.
        let target = match (value.workflow_id, value.bot_id) {
            (Some(workflow), _) if !workflow.is_empty() => ValidatorTarget::Workflow(workflow),
            (_, Some(bot)) if !bot.is_empty() => ValidatorTarget::Bot(bot),
            _ => return Err(ConfigError::MissingValidator { npc: value.id }),
        };

        let reward = match value.reward_mode.as_deref() {
            None | Some("fixed") => RewardMode::Fixed(value.reward.unwrap_or(DEFAULT_REWARD)),
            Some("ai") => RewardMode::AiAssigned,
            Some(other) => {
                return Err(ConfigError::UnknownRewardMode {
                    npc: value.id,
                    mode: other.to_owned(),
                });
            }
        };

        let response = match value.response_mode.as_deref() {
            None | Some("short") => ResponseMode::Short,
            Some("long") => ResponseMode::LongForm,
            Some(other) => {
                return Err(ConfigError::UnknownResponseMode {
                    npc: value.id,
                    mode: other.to_owned(),
                });
            }
        };

        Ok(Self {
            id: value.id,
            name: value.name,
            position,
            kind: NpcKind::Task(TaskSpec {
                task_type: value.kind,
                reward,
                response,
                target,
            }),
        })
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in catalog shipped with the binary.
fn default_catalog() -> LevelCatalog {
    let map = |rows: &[&str]| -> Vec<Vec<u8>> {
        rows.iter()
            .map(|row| row.bytes().map(|cell| cell - b'0').collect())
            .collect()
    };
    let town = map(&[
        "999999999999999",
        "900000000000009",
        "900011111110009",
        "900010000010009",
        "900010000010009",
        "900011111110009",
        "900000010000009",
        "900000010000009",
        "999999999999999",
    ]);

    let task = |id: &str, name: &str, x: i32, y: i32, kind: &str, workflow: &str| NpcDescriptor {
        id: id.to_owned(),
        name: name.to_owned(),
        position: Position::new(x, y),
        kind: NpcKind::Task(TaskSpec {
            task_type: kind.to_owned(),
            reward: RewardMode::Fixed(DEFAULT_REWARD),
            response: ResponseMode::Short,
            target: ValidatorTarget::Workflow(workflow.to_owned()),
        }),
    };
    let assistant = |id: &str, x: i32, y: i32| NpcDescriptor {
        id: id.to_owned(),
        name: "Assistant".to_owned(),
        position: Position::new(x, y),
        kind: NpcKind::Assistant,
    };

    LevelCatalog::new(vec![
        Level {
            id: 1,
            name: "Prompt Village".to_owned(),
            map: town.clone(),
            npcs: vec![
                task("prompt-basics", "Prompt Mentor", 4, 2, "prompt", "prompt_basics"),
                task("role-play", "Stage Director", 10, 2, "prompt", "role_play"),
                assistant("assistant-1", 7, 1),
            ],
            start_position: Position::new(7, 6),
        },
        Level {
            id: 2,
            name: "Workflow Workshop".to_owned(),
            map: town,
            npcs: vec![
                task("chain-of-thought", "Logic Keeper", 4, 5, "reasoning", "chain_of_thought"),
                task("structured-output", "Format Smith", 10, 5, "format", "structured_output"),
                assistant("assistant-2", 7, 1),
            ],
            start_position: Position::new(7, 6),
        },
    ])
}
