use shared::{
    domain::LeaderboardEntry,
    protocol::{ClientAction, EstimationOutcome, EstimationRound},
};

use super::{MiniGameKind, RoundGame};
use crate::error::{parse_finite, ValidationError};

/// "Guess the Sharpe": the player reads a realized return path and estimates
/// its risk-adjusted return.
#[derive(Debug)]
pub struct EstimationGame;

#[derive(Debug, Default)]
pub struct EstimationExtras {
    pub last_guess: Option<f64>,
    /// Best finished runs; replaced wholesale by the final round's board.
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl EstimationGame {
    pub fn parse_guess(raw: &str) -> Result<f64, ValidationError> {
        parse_finite("guess", raw)
    }
}

impl RoundGame for EstimationGame {
    type Round = EstimationRound;
    type Outcome = EstimationOutcome;
    type Submission = f64;
    type Extras = EstimationExtras;

    const KIND: MiniGameKind = MiniGameKind::Estimation;
    const START_ACTION: &'static str = "start_mini_game";
    const SUBMIT_ACTION: &'static str = "submit_mini_game";

    fn start_action() -> ClientAction {
        ClientAction::StartMiniGame
    }

    fn submit_action(guess: f64) -> ClientAction {
        ClientAction::SubmitMiniGame { guess }
    }

    fn round_index(round: &EstimationRound) -> u32 {
        round.round
    }

    fn total_rounds(round: &EstimationRound) -> Option<u32> {
        Some(round.total_rounds)
    }

    fn round_score(round: &EstimationRound) -> f64 {
        round.score as f64
    }

    fn is_game_over(outcome: &EstimationOutcome) -> bool {
        outcome.game_over
    }

    fn outcome_score(outcome: &EstimationOutcome) -> f64 {
        outcome.cumulative_score as f64
    }

    fn next_round(outcome: &EstimationOutcome) -> Option<EstimationRound> {
        outcome.next_round.clone()
    }

    fn reward(outcome: &EstimationOutcome) -> Option<String> {
        outcome.reward.clone()
    }

    fn validate_submission(_round: &EstimationRound, guess: f64) -> Result<(), ValidationError> {
        if guess.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::NotNumeric {
                field: "guess",
                raw: guess.to_string(),
            })
        }
    }

    fn on_start(extras: &mut EstimationExtras, round: &EstimationRound) {
        if let Some(board) = &round.leaderboard {
            extras.leaderboard = board.clone();
        }
    }

    fn on_submit(extras: &mut EstimationExtras, guess: f64) {
        extras.last_guess = Some(guess);
    }

    fn on_outcome(extras: &mut EstimationExtras, outcome: &EstimationOutcome) {
        if !outcome.game_over {
            return;
        }
        if let Some(board) = &outcome.leaderboard {
            extras.leaderboard = board.clone();
        }
    }
}
