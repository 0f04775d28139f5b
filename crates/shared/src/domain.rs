use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ChoiceEffect;

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

name_newtype!(AlphaId);
name_newtype!(StaffName);

/// Full authoritative game state as dumped by the server after every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub week: u32,
    pub year: u32,
    pub player: PlayerState,
    #[serde(default)]
    pub team: Vec<Quant>,
    #[serde(default)]
    pub pending_hires: Vec<Quant>,
    #[serde(default)]
    pub infra_team: Vec<InfraSpecialist>,
    #[serde(default)]
    pub pending_infra: Vec<InfraSpecialist>,
    #[serde(default)]
    pub portfolio: Portfolio,
    /// Capability name to level, e.g. `compute_level -> 2`.
    #[serde(default)]
    pub infrastructure: BTreeMap<String, u32>,
    #[serde(default)]
    pub risk_model: RiskModel,
    #[serde(default)]
    pub risk_research: Vec<RiskResearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience_score: Option<f64>,
    #[serde(default)]
    pub alphas: AlphaBook,
    #[serde(default)]
    pub events_queue: Vec<GameEvent>,
    #[serde(default)]
    pub message_log: Vec<String>,
    #[serde(default)]
    pub environment: MarketEnvironment,
    #[serde(default)]
    pub avg_team_happiness: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub cash: f64,
    pub aum: f64,
    #[serde(default)]
    pub rolling_sharpe: f64,
    pub level: u32,
    pub xp: i64,
    pub xp_to_next_level: i64,
    #[serde(default)]
    pub current_drawdown: f64,
    #[serde(default)]
    pub max_drawdown: f64,
    #[serde(default)]
    pub pnl_history: Vec<f64>,
    #[serde(default)]
    pub job_security: f64,
    #[serde(default)]
    pub reputation_management: f64,
    #[serde(default)]
    pub ability_points: u32,
    #[serde(default)]
    pub minigame_stats: MinigameStats,
}

impl PlayerState {
    /// Share of the current level already earned, clamped to `0..=100`.
    pub fn xp_progress_pct(&self) -> f64 {
        if self.xp_to_next_level <= 0 {
            return 0.0;
        }
        (self.xp as f64 / self.xp_to_next_level as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinigameStats {
    #[serde(default)]
    pub guess_sharpe_leaderboard: Vec<LeaderboardEntry>,
}

/// One finished estimation run, as ranked by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub score: i64,
    pub avg_error: f64,
    pub week: u32,
    pub year: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quant {
    pub name: StaffName,
    pub skill: f64,
    pub happiness: f64,
    #[serde(default)]
    pub salary: Option<f64>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_weeks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraSpecialist {
    pub name: StaffName,
    pub skill: f64,
    #[serde(default)]
    pub happiness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_weeks: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn weight_of(&self, alpha_id: &AlphaId) -> f64 {
        self.positions
            .iter()
            .find(|position| &position.alpha_id == alpha_id)
            .map(|position| position.weight)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub alpha_id: AlphaId,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub market_neutral: bool,
    #[serde(default)]
    pub factor_neutral: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResearch {
    pub name: String,
    #[serde(default)]
    pub weeks_remaining: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaBook {
    #[serde(default)]
    pub live: Vec<AlphaStrategy>,
    #[serde(default)]
    pub in_research: Vec<AlphaStrategy>,
    #[serde(default)]
    pub stored_for_ensemble: Vec<AlphaStrategy>,
    #[serde(default)]
    pub ensembles: Vec<AlphaStrategy>,
}

impl AlphaBook {
    /// Alphas that may carry portfolio weight.
    pub fn allocatable(&self) -> impl Iterator<Item = &AlphaStrategy> {
        self.live.iter().chain(self.ensembles.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaStrategy {
    pub id: AlphaId,
    pub name: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub weeks_remaining: i64,
    #[serde(default)]
    pub base_expected_return: f64,
    #[serde(default)]
    pub current_expected_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEnvironment {
    pub regime: String,
    #[serde(default)]
    pub weeks_in_regime: u32,
}

impl Default for MarketEnvironment {
    fn default() -> Self {
        Self {
            regime: "Unknown".into(),
            weeks_in_regime: 0,
        }
    }
}

/// A queued narrative interruption. An empty `choices` list means the event is
/// informational and is acknowledged through `clear_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub choices: Vec<EventChoice>,
}

impl GameEvent {
    pub fn is_informational(&self) -> bool {
        self.choices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventChoice {
    #[serde(rename = "text")]
    pub label: String,
    pub effect: ChoiceEffect,
}

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotInvariantError {
    #[error("duplicate quant name '{0}' in team")]
    DuplicateQuant(StaffName),
    #[error("duplicate infra specialist name '{0}'")]
    DuplicateInfraSpecialist(StaffName),
    #[error("negative happiness {happiness} for '{name}'")]
    NegativeHappiness { name: StaffName, happiness: f64 },
    #[error("portfolio references unknown alpha '{0}'")]
    UnknownPortfolioAlpha(AlphaId),
    #[error("negative portfolio weight {weight} for alpha '{alpha_id}'")]
    NegativeWeight { alpha_id: AlphaId, weight: f64 },
}

impl GameSnapshot {
    pub fn head_event(&self) -> Option<&GameEvent> {
        self.events_queue.first()
    }

    pub fn quant(&self, name: &StaffName) -> Option<&Quant> {
        self.team.iter().find(|quant| &quant.name == name)
    }

    pub fn infra_level(&self, capability: &str) -> u32 {
        self.infrastructure.get(capability).copied().unwrap_or(1)
    }

    /// Checks the structural invariants the client relies on.
    ///
    /// `xp >= xp_to_next_level` is tolerated: the server may hand out a
    /// snapshot right after an XP grant and before it rolls the level.
    /// Positions may also reference alphas still in the completed pool,
    /// because the server promotes those to live on allocation.
    pub fn validate(&self) -> Result<(), SnapshotInvariantError> {
        let mut seen = HashSet::new();
        for quant in &self.team {
            if !seen.insert(&quant.name) {
                return Err(SnapshotInvariantError::DuplicateQuant(quant.name.clone()));
            }
        }
        let mut seen = HashSet::new();
        for member in &self.infra_team {
            if !seen.insert(&member.name) {
                return Err(SnapshotInvariantError::DuplicateInfraSpecialist(
                    member.name.clone(),
                ));
            }
        }

        let staff_happiness = self
            .team
            .iter()
            .map(|quant| (&quant.name, quant.happiness))
            .chain(
                self.infra_team
                    .iter()
                    .map(|member| (&member.name, member.happiness)),
            );
        for (name, happiness) in staff_happiness {
            if happiness < 0.0 {
                return Err(SnapshotInvariantError::NegativeHappiness {
                    name: name.clone(),
                    happiness,
                });
            }
        }

        let known: HashSet<&AlphaId> = self
            .alphas
            .allocatable()
            .chain(self.alphas.stored_for_ensemble.iter())
            .map(|alpha| &alpha.id)
            .collect();
        for position in &self.portfolio.positions {
            if position.weight < 0.0 {
                return Err(SnapshotInvariantError::NegativeWeight {
                    alpha_id: position.alpha_id.clone(),
                    weight: position.weight,
                });
            }
            if !known.contains(&position.alpha_id) {
                return Err(SnapshotInvariantError::UnknownPortfolioAlpha(
                    position.alpha_id.clone(),
                ));
            }
        }

        Ok(())
    }
}
