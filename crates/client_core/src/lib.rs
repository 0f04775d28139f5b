//! Client-side session layer for the portfolio desk.
//!
//! The server owns the simulation. This crate caches its last snapshot,
//! dispatches player intents, runs the embedded mini-games as round-based
//! state machines and surfaces queued narrative events one at a time.

pub mod error;
pub mod event_modal;
pub mod hints;
pub mod minigame;
pub mod session;
pub mod store;
pub mod transport;

pub use error::{DispatchError, SessionError, Surface, ValidationError};
pub use event_modal::{EventModalController, ModalPhase, ModalResolution};
pub use minigame::{
    EstimationGame, MarketMakingGame, MiniGameKind, MiniGameSession, RoundGame, RoundPhase,
    RoundSession, RoundTransition, SessionVariant, TriviaGame,
};
pub use session::{ActionReceipt, GameSession, Notice, NoticeLevel, SessionEvent};
pub use store::SnapshotStore;
pub use transport::{ActionTransport, HttpTransport, UnavailableTransport};

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;
