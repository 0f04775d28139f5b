use shared::protocol::{ClientAction, MarketOutcome, MarketState, QuoteOutcome};

use super::{MiniGameKind, RoundGame};
use crate::error::{parse_finite, ValidationError};

/// Quote a symmetric spread around mid each round and manage the inventory
/// the fills leave behind. Score is the running PnL.
#[derive(Debug)]
pub struct MarketMakingGame;

#[derive(Debug, Default)]
pub struct MarketMakingExtras {
    /// Quote and fill outcome of every resolved round, oldest first.
    pub quotes: Vec<QuoteOutcome>,
    pub xp_gain: Option<i64>,
}

impl MarketMakingGame {
    pub fn parse_spread(raw: &str) -> Result<f64, ValidationError> {
        let spread = parse_finite("spread", raw)?;
        check_spread(spread)?;
        Ok(spread)
    }
}

fn check_spread(spread: f64) -> Result<(), ValidationError> {
    if spread.is_finite() && spread >= 0.0 {
        return Ok(());
    }
    Err(ValidationError::OutOfRange {
        field: "spread",
        min: 0.0,
        max: f64::MAX,
        value: spread,
    })
}

impl RoundGame for MarketMakingGame {
    type Round = MarketState;
    type Outcome = MarketOutcome;
    type Submission = f64;
    type Extras = MarketMakingExtras;

    const KIND: MiniGameKind = MiniGameKind::MarketMaking;
    const START_ACTION: &'static str = "start_mm_game";
    const SUBMIT_ACTION: &'static str = "submit_mm_action";
    const ADDITIVE_SCORE: bool = false;

    fn start_action() -> ClientAction {
        ClientAction::StartMmGame
    }

    fn submit_action(spread: f64) -> ClientAction {
        ClientAction::SubmitMmAction { spread }
    }

    fn round_index(state: &MarketState) -> u32 {
        state.round
    }

    fn total_rounds(state: &MarketState) -> Option<u32> {
        state.max_rounds
    }

    fn round_score(state: &MarketState) -> f64 {
        state.pnl
    }

    fn is_game_over(outcome: &MarketOutcome) -> bool {
        outcome.game_over
    }

    fn outcome_score(outcome: &MarketOutcome) -> f64 {
        outcome.state.pnl
    }

    /// The post-fill market state doubles as the next round's quote screen.
    fn next_round(outcome: &MarketOutcome) -> Option<MarketState> {
        Some(outcome.state.clone())
    }

    fn final_round(outcome: &MarketOutcome) -> Option<MarketState> {
        Some(outcome.state.clone())
    }

    fn reward(outcome: &MarketOutcome) -> Option<String> {
        outcome.reward.clone()
    }

    fn validate_submission(_state: &MarketState, spread: f64) -> Result<(), ValidationError> {
        check_spread(spread)
    }

    fn on_outcome(extras: &mut MarketMakingExtras, outcome: &MarketOutcome) {
        if let Some(quote) = outcome.state.last_action {
            extras.quotes.push(quote);
        }
        if outcome.game_over {
            extras.xp_gain = outcome.xp_gain;
        }
    }
}
