//! First-pass reward rules and the random prize drop.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::state::levels::RewardMode;

/// Probability used when the configuration does not provide one.
pub const DEFAULT_DROP_RATE: f64 = 0.01;

/// Feedback suffix shown when an AI-scored task came back without a score.
pub const MISSING_SCORE_WARNING: &str = "(no score was returned for this submission, 0 points awarded)";

/// Largest validator score honored; scores are persisted as signed 64-bit integers.
pub const MAX_AI_REWARD: u64 = i64::MAX as u64;

/// Points granted for a first-time pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardOutcome {
    /// Score increment.
    pub points: u64,
    /// Set when the validator was expected to score the submission and did not.
    pub missing_score: bool,
}

/// Decide the score increment of a first-time pass.
///
/// Validator scores are truncated and capped at [`MAX_AI_REWARD`]; negative or
/// non-finite values grant nothing.
pub fn compute_reward(mode: RewardMode, validator_score: Option<f64>) -> RewardOutcome {
    match mode {
        RewardMode::Fixed(points) => RewardOutcome {
            points: u64::from(points),
            missing_score: false,
        },
        RewardMode::AiAssigned => match validator_score {
            Some(score) if score.is_finite() && score > 0.0 => RewardOutcome {
                points: (score as u64).min(MAX_AI_REWARD),
                missing_score: false,
            },
            Some(_) => RewardOutcome {
                points: 0,
                missing_score: false,
            },
            None => RewardOutcome {
                points: 0,
                missing_score: true,
            },
        },
    }
}

/// Chance of winning one prize on every first-time pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropPolicy {
    /// Probability in `[0, 1]`.
    pub drop_rate: f64,
    /// Candidate prizes, drawn uniformly.
    pub prize_pool: Vec<String>,
}

impl Default for DropPolicy {
    fn default() -> Self {
        Self {
            drop_rate: DEFAULT_DROP_RATE,
            prize_pool: default_prize_pool(),
        }
    }
}

impl DropPolicy {
    /// Draw one sample; returns the won prize, if any.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.prize_pool.is_empty() {
            return None;
        }
        let sample: f64 = rng.random();
        if sample >= self.drop_rate {
            return None;
        }
        let index = rng.random_range(0..self.prize_pool.len());
        self.prize_pool.get(index).cloned()
    }
}

/// Prizes used when the configuration does not list any.
pub fn default_prize_pool() -> Vec<String> {
    [
        "✨ NVIDIA RTX 4090 (virtual edition)",
        "🎁 ChatGPT Plus monthly pass",
        "💎 Midjourney Pro subscription",
        "🚀 Coze enterprise access",
        "🏆 AI Training Master title",
        "📚 Complete AI cheat sheets",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn fixed_reward_ignores_validator_score() {
        let outcome = compute_reward(RewardMode::Fixed(100), Some(7.0));
        assert_eq!(outcome.points, 100);
        assert!(!outcome.missing_score);
    }

    #[test]
    fn ai_reward_uses_validator_score() {
        assert_eq!(compute_reward(RewardMode::AiAssigned, Some(85.6)).points, 85);
    }

    #[test]
    fn huge_ai_score_is_capped() {
        assert_eq!(compute_reward(RewardMode::AiAssigned, Some(1e30)).points, MAX_AI_REWARD);
        assert_eq!(
            compute_reward(RewardMode::AiAssigned, Some(f64::MAX)).points,
            MAX_AI_REWARD
        );
    }

    #[test]
    fn ai_reward_without_score_is_zero_with_warning() {
        let outcome = compute_reward(RewardMode::AiAssigned, None);
        assert_eq!(outcome.points, 0);
        assert!(outcome.missing_score);
    }

    #[test]
    fn invalid_scores_clamp_to_zero() {
        for score in [-5.0, f64::NAN, f64::NEG_INFINITY] {
            let outcome = compute_reward(RewardMode::AiAssigned, Some(score));
            assert_eq!(outcome.points, 0);
            assert!(!outcome.missing_score);
        }
    }

    #[test]
    fn certain_drop_always_wins_a_pool_item() {
        let policy = DropPolicy {
            drop_rate: 1.0,
            prize_pool: vec!["lamp".into(), "key".into()],
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let prize = policy.roll(&mut rng).unwrap();
            assert!(policy.prize_pool.contains(&prize));
        }
    }

    #[test]
    fn zero_rate_or_empty_pool_never_drops() {
        let mut rng = StdRng::seed_from_u64(7);
        let never = DropPolicy {
            drop_rate: 0.0,
            prize_pool: vec!["lamp".into()],
        };
        let empty = DropPolicy {
            drop_rate: 1.0,
            prize_pool: Vec::new(),
        };
        for _ in 0..20 {
            assert!(never.roll(&mut rng).is_none());
            assert!(empty.roll(&mut rng).is_none());
        }
    }
}
