use shared::protocol::{ClientAction, TriviaOutcome, TriviaQuestion};

use super::{MiniGameKind, RoundGame};
use crate::error::ValidationError;

/// Multiple-choice market trivia. A wrong answer reveals the right option but
/// does not end the run.
#[derive(Debug)]
pub struct TriviaGame;

impl RoundGame for TriviaGame {
    type Round = TriviaQuestion;
    type Outcome = TriviaOutcome;
    type Submission = usize;
    type Extras = ();

    const KIND: MiniGameKind = MiniGameKind::Trivia;
    const START_ACTION: &'static str = "start_trivia_game";
    const SUBMIT_ACTION: &'static str = "submit_trivia_game";

    fn start_action() -> ClientAction {
        ClientAction::StartTriviaGame
    }

    fn submit_action(choice: usize) -> ClientAction {
        ClientAction::SubmitTriviaGame { choice }
    }

    fn round_index(question: &TriviaQuestion) -> u32 {
        question.index
    }

    fn total_rounds(question: &TriviaQuestion) -> Option<u32> {
        Some(question.total)
    }

    fn round_score(question: &TriviaQuestion) -> f64 {
        question.score as f64
    }

    fn is_game_over(outcome: &TriviaOutcome) -> bool {
        outcome.game_over
    }

    fn outcome_score(outcome: &TriviaOutcome) -> f64 {
        outcome.score as f64
    }

    fn next_round(outcome: &TriviaOutcome) -> Option<TriviaQuestion> {
        outcome.next_question.clone()
    }

    fn reward(outcome: &TriviaOutcome) -> Option<String> {
        outcome.reward.clone()
    }

    fn validate_submission(question: &TriviaQuestion, choice: usize) -> Result<(), ValidationError> {
        if choice < question.options.len() {
            Ok(())
        } else {
            Err(ValidationError::NoSuchOption {
                choice,
                available: question.options.len(),
            })
        }
    }
}
