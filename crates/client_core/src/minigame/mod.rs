//! Round-based mini-game sessions.
//!
//! All three embedded games share one machine: the server hands out a round,
//! the player submits once, and the server answers with an outcome that
//! either carries the next round or ends the game. [`RoundSession`] runs that
//! loop generically; each game plugs its payload types in through
//! [`RoundGame`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::protocol::{result_rejection, ClientAction};
use tracing::{info, warn};

use crate::error::{SessionError, ValidationError};

mod estimation;
mod market_making;
mod trivia;

pub use estimation::{EstimationExtras, EstimationGame};
pub use market_making::{MarketMakingExtras, MarketMakingGame};
pub use trivia::TriviaGame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiniGameKind {
    Estimation,
    Trivia,
    MarketMaking,
}

impl fmt::Display for MiniGameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Estimation => "estimation",
            Self::Trivia => "trivia",
            Self::MarketMaking => "market-making",
        };
        f.write_str(name)
    }
}

pub trait RoundGame {
    type Round: DeserializeOwned + Clone + fmt::Debug;
    type Outcome: DeserializeOwned + Clone + fmt::Debug;
    type Submission: Copy + fmt::Debug;
    /// Variant-specific state that lives for the whole session.
    type Extras: Default + fmt::Debug;

    const KIND: MiniGameKind;
    const START_ACTION: &'static str;
    const SUBMIT_ACTION: &'static str;
    /// Whether the server score only ever grows within a session.
    const ADDITIVE_SCORE: bool = true;

    fn start_action() -> ClientAction;
    fn submit_action(submission: Self::Submission) -> ClientAction;

    fn round_index(round: &Self::Round) -> u32;
    fn total_rounds(round: &Self::Round) -> Option<u32>;
    fn round_score(round: &Self::Round) -> f64;

    fn is_game_over(outcome: &Self::Outcome) -> bool;
    fn outcome_score(outcome: &Self::Outcome) -> f64;
    fn next_round(outcome: &Self::Outcome) -> Option<Self::Round>;
    fn reward(outcome: &Self::Outcome) -> Option<String>;
    /// State left on screen by the finishing result, when the variant reports one.
    fn final_round(_outcome: &Self::Outcome) -> Option<Self::Round> {
        None
    }

    fn validate_submission(
        _round: &Self::Round,
        _submission: Self::Submission,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn on_start(_extras: &mut Self::Extras, _round: &Self::Round) {}
    fn on_submit(_extras: &mut Self::Extras, _submission: Self::Submission) {}
    fn on_outcome(_extras: &mut Self::Extras, _outcome: &Self::Outcome) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for the player's submission for this round.
    Active(u32),
    /// Submission for this round is on the wire.
    Awaiting(u32),
    /// The server ended the game; only close or a new start are legal.
    Terminal,
}

/// What an accepted round result did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundTransition {
    Advanced { resolved: u32, next: u32 },
    Finished { resolved: u32, reward: Option<String> },
}

#[derive(Debug)]
pub struct RoundSession<G: RoundGame> {
    phase: RoundPhase,
    round: G::Round,
    total_rounds: Option<u32>,
    score: f64,
    last_outcome: Option<G::Outcome>,
    extras: G::Extras,
}

impl<G: RoundGame> RoundSession<G> {
    pub fn begin(game_data: Value) -> Result<Self, SessionError> {
        let round: G::Round = serde_json::from_value(game_data).map_err(|err| {
            SessionError::Protocol(format!("invalid {} start payload: {err}", G::KIND))
        })?;
        let index = G::round_index(&round);
        if index != 1 {
            warn!(kind = %G::KIND, index, "minigame: session did not start at round 1");
        }
        let mut extras = G::Extras::default();
        G::on_start(&mut extras, &round);
        info!(kind = %G::KIND, index, total = ?G::total_rounds(&round), "minigame: session started");
        Ok(Self {
            phase: RoundPhase::Active(index),
            total_rounds: G::total_rounds(&round),
            score: G::round_score(&round),
            round,
            last_outcome: None,
            extras,
        })
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round(&self) -> &G::Round {
        &self.round
    }

    pub fn round_index(&self) -> u32 {
        G::round_index(&self.round)
    }

    pub fn total_rounds(&self) -> Option<u32> {
        self.total_rounds
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn last_outcome(&self) -> Option<&G::Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn extras(&self) -> &G::Extras {
        &self.extras
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == RoundPhase::Terminal
    }

    /// Validates the submission and moves the session to `Awaiting`.
    pub fn prepare_submit(
        &mut self,
        submission: G::Submission,
    ) -> Result<ClientAction, SessionError> {
        let index = match self.phase {
            RoundPhase::Active(index) => index,
            RoundPhase::Awaiting(_) => {
                return Err(SessionError::Busy(crate::error::Surface::MiniGameRound))
            }
            RoundPhase::Terminal => return Err(SessionError::SessionFinished(G::KIND)),
        };
        G::validate_submission(&self.round, submission)?;
        G::on_submit(&mut self.extras, submission);
        self.phase = RoundPhase::Awaiting(index);
        Ok(G::submit_action(submission))
    }

    /// Returns to `Active` after a submission that never produced a result.
    pub fn abort_submit(&mut self) {
        if let RoundPhase::Awaiting(index) = self.phase {
            self.phase = RoundPhase::Active(index);
        }
    }

    /// Folds a server `result` into the session. The server alone decides
    /// when the game ends.
    pub fn apply_result(&mut self, result: Value) -> Result<RoundTransition, SessionError> {
        let RoundPhase::Awaiting(resolved) = self.phase else {
            return Err(SessionError::Protocol(format!(
                "{} result arrived without a pending submission",
                G::KIND
            )));
        };

        if let Some(rejection) = result_rejection(&result) {
            warn!(kind = %G::KIND, message = %rejection.message, "minigame: server has no active game");
            self.phase = RoundPhase::Terminal;
            return Err(SessionError::Rejected(rejection));
        }

        let outcome: G::Outcome = match serde_json::from_value(result) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.phase = RoundPhase::Active(resolved);
                return Err(SessionError::Protocol(format!(
                    "invalid {} round result: {err}",
                    G::KIND
                )));
            }
        };

        let score = G::outcome_score(&outcome);
        if G::ADDITIVE_SCORE && score < self.score {
            warn!(kind = %G::KIND, previous = self.score, score, "minigame: server score decreased");
        }

        if G::is_game_over(&outcome) {
            G::on_outcome(&mut self.extras, &outcome);
            self.score = score;
            self.phase = RoundPhase::Terminal;
            if let Some(last) = G::final_round(&outcome) {
                self.round = last;
            }
            let reward = G::reward(&outcome);
            self.last_outcome = Some(outcome);
            info!(kind = %G::KIND, round = resolved, score, "minigame: session finished");
            return Ok(RoundTransition::Finished { resolved, reward });
        }

        let Some(next_round) = G::next_round(&outcome) else {
            self.phase = RoundPhase::Active(resolved);
            return Err(SessionError::UnexpectedPayload {
                action: G::SUBMIT_ACTION,
                field: "next round",
            });
        };
        let next = G::round_index(&next_round);
        if next != resolved + 1 {
            self.phase = RoundPhase::Active(resolved);
            return Err(SessionError::Protocol(format!(
                "{} advanced from round {resolved} to {next}",
                G::KIND
            )));
        }

        G::on_outcome(&mut self.extras, &outcome);
        self.score = score;
        self.round = next_round;
        self.last_outcome = Some(outcome);
        self.phase = RoundPhase::Active(next);
        info!(kind = %G::KIND, resolved, next, score, "minigame: round resolved");
        Ok(RoundTransition::Advanced { resolved, next })
    }
}

/// Ties a game to its slot in [`MiniGameSession`].
pub trait SessionVariant: RoundGame + Sized {
    fn wrap(session: RoundSession<Self>) -> MiniGameSession;
    fn slot(session: &MiniGameSession) -> Option<&RoundSession<Self>>;
    fn slot_mut(session: &mut MiniGameSession) -> Option<&mut RoundSession<Self>>;
}

macro_rules! session_variants {
    ($($variant:ident => $game:ty),+ $(,)?) => {
        /// The single mini-game the player may have open.
        #[derive(Debug)]
        pub enum MiniGameSession {
            $($variant(RoundSession<$game>),)+
        }

        impl MiniGameSession {
            pub fn kind(&self) -> MiniGameKind {
                match self {
                    $(Self::$variant(_) => <$game as RoundGame>::KIND,)+
                }
            }

            pub fn phase(&self) -> RoundPhase {
                match self {
                    $(Self::$variant(session) => session.phase(),)+
                }
            }

            pub fn round_index(&self) -> u32 {
                match self {
                    $(Self::$variant(session) => session.round_index(),)+
                }
            }

            pub fn total_rounds(&self) -> Option<u32> {
                match self {
                    $(Self::$variant(session) => session.total_rounds(),)+
                }
            }

            pub fn score(&self) -> f64 {
                match self {
                    $(Self::$variant(session) => session.score(),)+
                }
            }

            pub fn abort_submit(&mut self) {
                match self {
                    $(Self::$variant(session) => session.abort_submit(),)+
                }
            }

            pub fn apply_result(&mut self, result: Value) -> Result<RoundTransition, SessionError> {
                match self {
                    $(Self::$variant(session) => session.apply_result(result),)+
                }
            }
        }

        $(
            impl SessionVariant for $game {
                fn wrap(session: RoundSession<Self>) -> MiniGameSession {
                    MiniGameSession::$variant(session)
                }

                fn slot(session: &MiniGameSession) -> Option<&RoundSession<Self>> {
                    match session {
                        MiniGameSession::$variant(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn slot_mut(session: &mut MiniGameSession) -> Option<&mut RoundSession<Self>> {
                    match session {
                        MiniGameSession::$variant(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )+
    };
}

session_variants! {
    Estimation => EstimationGame,
    Trivia => TriviaGame,
    MarketMaking => MarketMakingGame,
}

impl MiniGameSession {
    pub fn is_terminal(&self) -> bool {
        self.phase() == RoundPhase::Terminal
    }

    /// Active or awaiting a result; a new start is refused in this state.
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase(), RoundPhase::Awaiting(_))
    }
}

#[cfg(test)]
#[path = "../tests/minigame_tests.rs"]
mod tests;
