use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{GameSnapshot, LeaderboardEntry, Position, StaffName},
    error::{EffectDecodeError, ServerRejection},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetDecision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffKind {
    Quant,
    Infra,
}

/// Infrastructure ask payload. It is echoed back to the server verbatim, so
/// fields the client does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What picking an event choice does. The server encodes these either as a
/// bare keyword (`"restart"`, `"continue"`) or as an object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ChoiceEffect {
    Restart,
    Continue,
    ResetOffer(ResetDecision),
    InfraRequest(InfraRequest),
}

impl TryFrom<Value> for ChoiceEffect {
    type Error = EffectDecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(keyword) => match keyword.as_str() {
                "restart" => Ok(Self::Restart),
                "continue" => Ok(Self::Continue),
                _ => Err(EffectDecodeError::UnknownKeyword(keyword)),
            },
            Value::Object(object) => {
                let kind = object
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or(EffectDecodeError::MissingType)?
                    .to_string();
                let malformed = |err: serde_json::Error| EffectDecodeError::Malformed {
                    kind: kind.clone(),
                    reason: err.to_string(),
                };
                if kind == "reset_offer" {
                    let decision = object.get("decision").cloned().unwrap_or(Value::Null);
                    serde_json::from_value(decision)
                        .map(Self::ResetOffer)
                        .map_err(malformed)
                } else if kind.contains("infra") {
                    serde_json::from_value(Value::Object(object))
                        .map(Self::InfraRequest)
                        .map_err(malformed)
                } else {
                    Err(EffectDecodeError::UnknownType(kind))
                }
            }
            _ => Err(EffectDecodeError::UnsupportedShape),
        }
    }
}

impl From<ChoiceEffect> for Value {
    fn from(effect: ChoiceEffect) -> Self {
        match effect {
            ChoiceEffect::Restart => Value::String("restart".into()),
            ChoiceEffect::Continue => Value::String("continue".into()),
            ChoiceEffect::ResetOffer(decision) => serde_json::json!({
                "type": "reset_offer",
                "decision": decision,
            }),
            ChoiceEffect::InfraRequest(request) => {
                serde_json::to_value(request).unwrap_or(Value::Null)
            }
        }
    }
}

/// Every intent the client may send. Serialized flat as `{type, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    NextTurn,
    StartResearch {
        style: String,
        duration: u32,
    },
    HireQuant {
        name: StaffName,
        skill: u32,
        salary: u64,
    },
    UpgradeInfra {
        infra_type: String,
    },
    UpdatePortfolio {
        positions: Vec<Position>,
    },
    HireInfra {
        name: StaffName,
        skill: u32,
    },
    FireStaff {
        staff_type: StaffKind,
        name: StaffName,
    },
    RestartGame,
    HandleResetOffer {
        decision: ResetDecision,
    },
    HandleInfraRequest {
        effect: InfraRequest,
    },
    ClearEvent,
    SaveGame {
        name: String,
    },
    LoadGame {
        name: String,
    },
    ListSaves,
    StartMiniGame,
    SubmitMiniGame {
        guess: f64,
    },
    StartTriviaGame,
    SubmitTriviaGame {
        choice: usize,
    },
    StartMmGame,
    SubmitMmAction {
        spread: f64,
    },
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NextTurn => "next_turn",
            Self::StartResearch { .. } => "start_research",
            Self::HireQuant { .. } => "hire_quant",
            Self::UpgradeInfra { .. } => "upgrade_infra",
            Self::UpdatePortfolio { .. } => "update_portfolio",
            Self::HireInfra { .. } => "hire_infra",
            Self::FireStaff { .. } => "fire_staff",
            Self::RestartGame => "restart_game",
            Self::HandleResetOffer { .. } => "handle_reset_offer",
            Self::HandleInfraRequest { .. } => "handle_infra_request",
            Self::ClearEvent => "clear_event",
            Self::SaveGame { .. } => "save_game",
            Self::LoadGame { .. } => "load_game",
            Self::ListSaves => "list_saves",
            Self::StartMiniGame => "start_mini_game",
            Self::SubmitMiniGame { .. } => "submit_mini_game",
            Self::StartTriviaGame => "start_trivia_game",
            Self::SubmitTriviaGame { .. } => "submit_trivia_game",
            Self::StartMmGame => "start_mm_game",
            Self::SubmitMmAction { .. } => "submit_mm_action",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Envelope returned for every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<GameSnapshot>,
    /// Initial payload of a freshly started mini-game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<Value>,
    /// Round or terminal outcome of an in-progress mini-game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saves: Option<Vec<String>>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            state: None,
            game_data: None,
            result: None,
            saves: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn with_state(mut self, state: GameSnapshot) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_game_data(mut self, game_data: Value) -> Self {
        self.game_data = Some(game_data);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_saves(mut self, saves: Vec<String>) -> Self {
        self.saves = Some(saves);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn rejection(&self) -> Option<ServerRejection> {
        if self.is_ok() {
            return None;
        }
        Some(ServerRejection::new(
            self.message
                .clone()
                .unwrap_or_else(|| "request rejected by server".to_string()),
        ))
    }
}

/// `{"error": "No active game"}` style refusal carried inside `result`.
pub fn result_rejection(result: &Value) -> Option<ServerRejection> {
    result
        .get("error")
        .and_then(Value::as_str)
        .map(ServerRejection::new)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationRound {
    pub round: u32,
    pub total_rounds: u32,
    pub score: i64,
    /// Realized cumulative-return path for the round, for plotting.
    pub cumulative: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationOutcome {
    #[serde(alias = "true_value")]
    pub true_sharpe: f64,
    pub error: f64,
    pub points: i64,
    pub cumulative_score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_finished: Option<u32>,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_round: Option<EstimationRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaQuestion {
    pub index: u32,
    pub total: u32,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaOutcome {
    pub correct: bool,
    pub answer_index: usize,
    pub score: i64,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question: Option<TriviaQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteOutcome {
    pub bid: f64,
    pub ask: f64,
    pub buy_filled: bool,
    pub sell_filled: bool,
}

impl QuoteOutcome {
    /// Mid price the quote was centred on, before the market moved.
    pub fn quoted_mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn half_spread(&self) -> f64 {
        (self.ask - self.bid) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    pub mid_price: f64,
    pub inventory: i64,
    pub cash: f64,
    pub pnl: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<QuoteOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOutcome {
    pub game_over: bool,
    pub state: MarketState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_gain: Option<i64>,
}
