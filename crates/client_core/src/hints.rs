//! Pure projections over a snapshot that the desk shows next to its forms.

use shared::domain::GameSnapshot;

const BASE_SALARY: u64 = 40_000;
const SALARY_PER_SKILL_POINT: f64 = 1_200.0;
const MAX_RESEARCH_SPEEDUP: f64 = 0.5;

/// Lowest salary the server accepts for a quant of this skill.
pub fn minimum_salary_for_skill(skill: u32) -> u64 {
    BASE_SALARY + (f64::from(skill) * SALARY_PER_SKILL_POINT).floor() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalaryHint {
    pub minimum: u64,
    pub below_minimum: bool,
}

pub fn salary_hint(skill: u32, offered: u64) -> SalaryHint {
    let minimum = minimum_salary_for_skill(skill);
    SalaryHint {
        minimum,
        below_minimum: offered < minimum,
    }
}

/// Weeks a research project of `base_weeks` is expected to take with the
/// current team size and data/compute infrastructure.
pub fn research_duration_estimate(snapshot: &GameSnapshot, base_weeks: u32) -> u32 {
    let team_bonus = 0.05 * snapshot.team.len() as f64;
    let data_bonus = 0.05 * (f64::from(snapshot.infra_level("data_quality")) - 1.0);
    let compute_bonus = 0.03 * (f64::from(snapshot.infra_level("compute_level")) - 1.0);
    let reduction = (team_bonus + data_bonus + compute_bonus).min(MAX_RESEARCH_SPEEDUP);
    let effective = (f64::from(base_weeks) * (1.0 - reduction)).round();
    effective.max(1.0) as u32
}

pub fn xp_progress_pct(snapshot: &GameSnapshot) -> f64 {
    snapshot.player.xp_progress_pct()
}

/// Server-computed average if present, else the mean over the team.
pub fn average_happiness(snapshot: &GameSnapshot) -> Option<f64> {
    if let Some(avg) = snapshot.avg_team_happiness {
        return Some(avg);
    }
    if snapshot.team.is_empty() {
        return None;
    }
    let total: f64 = snapshot.team.iter().map(|quant| quant.happiness).sum();
    Some(total / snapshot.team.len() as f64)
}

/// `compute_level` -> `Compute Level`.
pub fn infra_display_name(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Running sum of the weekly PnL history.
pub fn cumulative_pnl(history: &[f64]) -> Vec<f64> {
    history
        .iter()
        .scan(0.0, |sum, pnl| {
            *sum += pnl;
            Some(*sum)
        })
        .collect()
}
