//! Top-level coordinator between the player, the server and local state.
//!
//! [`GameSession`] owns the snapshot store, the single optional mini-game
//! session and the event modal. Every operation validates locally, claims
//! its [`Surface`], performs exactly one round trip through the
//! [`ActionTransport`] and merges the response back. The state lock is
//! never held across that round trip.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex as StdMutex},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{AlphaId, GameEvent, GameSnapshot, Position, StaffName},
    protocol::{ActionResponse, ClientAction, StaffKind},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{require_name, SessionError, Surface, ValidationError},
    event_modal::{EventModalController, ModalPhase, ModalResolution},
    minigame::{
        EstimationGame, MarketMakingGame, MiniGameKind, MiniGameSession, RoundSession,
        RoundTransition, SessionVariant, TriviaGame,
    },
    store::SnapshotStore,
    transport::{ActionTransport, UnavailableTransport},
};

pub const DEFAULT_SAVE_NAME: &str = "savegame";
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-blocking message for the player (server messages, rejections,
/// transport failures).
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    SnapshotReplaced {
        version: u64,
        week: u32,
        year: u32,
    },
    MiniGameStarted {
        kind: MiniGameKind,
        round: u32,
        total_rounds: Option<u32>,
    },
    RoundResolved {
        kind: MiniGameKind,
        resolved: u32,
        next: u32,
        score: f64,
    },
    MiniGameFinished {
        kind: MiniGameKind,
        score: f64,
        reward: Option<String>,
    },
    MiniGameClosed(MiniGameKind),
    EventShown(GameEvent),
    EventResolved {
        title: String,
        /// False for a local `continue` dismissal.
        dispatched: bool,
    },
    SavesListed(Vec<String>),
    Notice(Notice),
}

/// Result of a plain desk or saves action.
#[derive(Debug, Clone, Default)]
pub struct ActionReceipt {
    pub message: Option<String>,
    pub snapshot: Option<Arc<GameSnapshot>>,
}

#[derive(Default)]
struct SessionState {
    store: SnapshotStore,
    minigame: Option<MiniGameSession>,
    modal: EventModalController,
}

pub struct GameSession {
    transport: Arc<dyn ActionTransport>,
    state: Mutex<SessionState>,
    inflight: StdMutex<HashSet<Surface>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Releases its surface on drop, whatever the round trip's outcome.
struct SurfaceGuard<'a> {
    inflight: &'a StdMutex<HashSet<Surface>>,
    surface: Surface,
}

impl Drop for SurfaceGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inflight.remove(&self.surface);
    }
}

impl GameSession {
    /// A session with no server behind it; every request fails with
    /// [`crate::error::DispatchError::Unavailable`].
    pub fn unconfigured() -> Arc<Self> {
        Self::new(Arc::new(UnavailableTransport))
    }

    pub fn new(transport: Arc<dyn ActionTransport>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            transport,
            state: Mutex::new(SessionState::default()),
            inflight: StdMutex::new(HashSet::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Option<Arc<GameSnapshot>> {
        self.state.lock().await.store.current()
    }

    pub async fn snapshot_version(&self) -> u64 {
        self.state.lock().await.store.version()
    }

    pub async fn current_event(&self) -> Option<GameEvent> {
        self.state.lock().await.modal.current().cloned()
    }

    pub async fn modal_phase(&self) -> ModalPhase {
        self.state.lock().await.modal.phase()
    }

    /// Runs `view` against the open mini-game, if any.
    pub async fn with_mini_game<R>(&self, view: impl FnOnce(Option<&MiniGameSession>) -> R) -> R {
        let state = self.state.lock().await;
        view(state.minigame.as_ref())
    }

    pub fn is_busy(&self, surface: Surface) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&surface)
    }

    // ---- desk ----------------------------------------------------------

    /// Initial (or forced) load of the authoritative state.
    pub async fn load_state(&self) -> Result<Arc<GameSnapshot>, SessionError> {
        let _guard = self.claim(Surface::Desk)?;
        self.refresh_state().await
    }

    pub async fn next_turn(&self) -> Result<ActionReceipt, SessionError> {
        self.run_desk_action(ClientAction::NextTurn).await
    }

    pub async fn start_research(
        &self,
        style: &str,
        duration: u32,
    ) -> Result<ActionReceipt, SessionError> {
        let style = require_name("style", style)?;
        if duration == 0 {
            return Err(ValidationError::OutOfRange {
                field: "duration",
                min: 1.0,
                max: f64::from(u32::MAX),
                value: 0.0,
            }
            .into());
        }
        self.run_desk_action(ClientAction::StartResearch { style, duration })
            .await
    }

    /// The salary floor is enforced by the server; see
    /// [`crate::hints::salary_hint`] for the advisory check.
    pub async fn hire_quant(
        &self,
        name: &str,
        skill: u32,
        salary: u64,
    ) -> Result<ActionReceipt, SessionError> {
        let name = StaffName(require_name("name", name)?);
        self.run_desk_action(ClientAction::HireQuant {
            name,
            skill,
            salary,
        })
        .await
    }

    pub async fn hire_infra(&self, name: &str, skill: u32) -> Result<ActionReceipt, SessionError> {
        let name = StaffName(require_name("name", name)?);
        self.run_desk_action(ClientAction::HireInfra { name, skill })
            .await
    }

    pub async fn fire_staff(
        &self,
        staff_type: StaffKind,
        name: &str,
    ) -> Result<ActionReceipt, SessionError> {
        let name = StaffName(require_name("name", name)?);
        self.run_desk_action(ClientAction::FireStaff { staff_type, name })
            .await
    }

    pub async fn upgrade_infra(&self, infra_type: &str) -> Result<ActionReceipt, SessionError> {
        let infra_type = require_name("infra_type", infra_type)?;
        self.run_desk_action(ClientAction::UpgradeInfra { infra_type })
            .await
    }

    /// Sends the full target allocation. Zero weights are dropped; every id
    /// must name a live, ensemble or stored alpha in the current snapshot.
    pub async fn update_portfolio(
        &self,
        weights: Vec<(AlphaId, f64)>,
    ) -> Result<ActionReceipt, SessionError> {
        let snapshot = self.snapshot().await.ok_or(SessionError::Uninitialized)?;
        let mut positions = Vec::with_capacity(weights.len());
        for (alpha_id, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::OutOfRange {
                    field: "weight",
                    min: 0.0,
                    max: f64::MAX,
                    value: weight,
                }
                .into());
            }
            let known = snapshot
                .alphas
                .allocatable()
                .chain(snapshot.alphas.stored_for_ensemble.iter())
                .any(|alpha| alpha.id == alpha_id);
            if !known {
                return Err(ValidationError::UnknownAlpha(alpha_id.0).into());
            }
            if weight > 0.0 {
                positions.push(Position { alpha_id, weight });
            }
        }
        self.run_desk_action(ClientAction::UpdatePortfolio { positions })
            .await
    }

    pub async fn restart_game(&self) -> Result<ActionReceipt, SessionError> {
        self.run_desk_action(ClientAction::RestartGame).await
    }

    // ---- saves ---------------------------------------------------------

    pub async fn save_game(&self, name: &str) -> Result<ActionReceipt, SessionError> {
        let name = save_name(name);
        self.run_action(Surface::Saves, ClientAction::SaveGame { name })
            .await
    }

    pub async fn load_game(&self, name: &str) -> Result<ActionReceipt, SessionError> {
        let name = save_name(name);
        self.run_action(Surface::Saves, ClientAction::LoadGame { name })
            .await
    }

    pub async fn list_saves(&self) -> Result<Vec<String>, SessionError> {
        let _guard = self.claim(Surface::Saves)?;
        let response = self.dispatch(&ClientAction::ListSaves).await?;
        self.reject_if_error(&response)?;
        let saves = response.saves.unwrap_or_default();
        debug!(count = saves.len(), "session: saves listed");
        self.publish(SessionEvent::SavesListed(saves.clone()));
        Ok(saves)
    }

    // ---- mini-games ----------------------------------------------------

    pub async fn start_estimation(&self) -> Result<(), SessionError> {
        self.start::<EstimationGame>().await
    }

    /// Parses the raw guess field and submits it.
    pub async fn submit_estimation_guess(
        &self,
        raw: &str,
    ) -> Result<RoundTransition, SessionError> {
        let guess = EstimationGame::parse_guess(raw)?;
        self.submit::<EstimationGame>(guess).await
    }

    pub async fn start_trivia(&self) -> Result<(), SessionError> {
        self.start::<TriviaGame>().await
    }

    pub async fn answer_trivia(&self, choice: usize) -> Result<RoundTransition, SessionError> {
        self.submit::<TriviaGame>(choice).await
    }

    pub async fn start_market_making(&self) -> Result<(), SessionError> {
        self.start::<MarketMakingGame>().await
    }

    pub async fn submit_spread(&self, raw: &str) -> Result<RoundTransition, SessionError> {
        let spread = MarketMakingGame::parse_spread(raw)?;
        self.submit::<MarketMakingGame>(spread).await
    }

    /// Starts a `G` session. Refused without a request while any session is
    /// still in progress; a finished session is replaced.
    pub async fn start<G: SessionVariant>(&self) -> Result<(), SessionError> {
        let _guard = self.claim(Surface::MiniGameStart)?;
        {
            let state = self.state.lock().await;
            if let Some(open) = state.minigame.as_ref().filter(|open| open.is_in_progress()) {
                debug!(open = %open.kind(), requested = %G::KIND, "session: start refused");
                return Err(SessionError::SessionActive(open.kind()));
            }
        }

        let response = self.dispatch(&G::start_action()).await?;
        self.reject_if_error(&response)?;
        let ActionResponse {
            state: snapshot,
            game_data,
            ..
        } = response;
        let game_data = game_data.ok_or(SessionError::UnexpectedPayload {
            action: G::START_ACTION,
            field: "game_data",
        })?;
        let session = RoundSession::<G>::begin(game_data)?;
        let started = SessionEvent::MiniGameStarted {
            kind: G::KIND,
            round: session.round_index(),
            total_rounds: session.total_rounds(),
        };

        let mut state = self.state.lock().await;
        if let Some(snapshot) = snapshot {
            self.reconcile(&mut state, snapshot);
        }
        if let Some(previous) = state.minigame.replace(G::wrap(session)) {
            debug!(previous = %previous.kind(), "session: discarded finished mini-game");
        }
        drop(state);
        self.publish(started);
        Ok(())
    }

    /// Submits one round of the open `G` session and folds the result in.
    pub async fn submit<G: SessionVariant>(
        &self,
        submission: G::Submission,
    ) -> Result<RoundTransition, SessionError> {
        let _guard = self.claim(Surface::MiniGameRound)?;
        let action = {
            let mut state = self.state.lock().await;
            let session = state
                .minigame
                .as_mut()
                .and_then(G::slot_mut)
                .ok_or(SessionError::NoActiveSession(G::KIND))?;
            session.prepare_submit(submission)?
        };

        let response = match self.dispatch(&action).await {
            Ok(response) => response,
            Err(err) => {
                self.abort_submit::<G>().await;
                return Err(err);
            }
        };
        if let Err(err) = self.reject_if_error(&response) {
            self.abort_submit::<G>().await;
            return Err(err);
        }
        let ActionResponse {
            state: snapshot,
            result,
            ..
        } = response;

        // The accepted response's state lands whatever the result says.
        let mut state = self.state.lock().await;
        let reconciled = match snapshot {
            Some(snapshot) => {
                self.reconcile(&mut state, snapshot);
                true
            }
            None => false,
        };
        let session = state
            .minigame
            .as_mut()
            .and_then(G::slot_mut)
            .ok_or_else(|| {
                SessionError::Protocol(format!("{} session vanished mid-round", G::KIND))
            })?;
        let Some(result) = result else {
            session.abort_submit();
            return Err(SessionError::UnexpectedPayload {
                action: G::SUBMIT_ACTION,
                field: "result",
            });
        };
        let transition = match session.apply_result(result) {
            Ok(transition) => transition,
            Err(err) => {
                drop(state);
                if let SessionError::Rejected(rejection) = &err {
                    self.notify(NoticeLevel::Warning, rejection.message.clone());
                }
                return Err(err);
            }
        };
        let score = session.score();
        drop(state);
        let needs_refresh = !reconciled && matches!(transition, RoundTransition::Finished { .. });

        match &transition {
            RoundTransition::Advanced { resolved, next } => {
                self.publish(SessionEvent::RoundResolved {
                    kind: G::KIND,
                    resolved: *resolved,
                    next: *next,
                    score,
                });
            }
            RoundTransition::Finished { reward, .. } => {
                self.publish(SessionEvent::MiniGameFinished {
                    kind: G::KIND,
                    score,
                    reward: reward.clone(),
                });
                if let Some(reward) = reward {
                    self.notify(NoticeLevel::Info, reward.clone());
                }
            }
        }

        if needs_refresh {
            // The reward landed server-side; pull it in before the desk redraws.
            if let Err(err) = self.refresh_state().await {
                warn!(kind = %G::KIND, error = %err, "session: post-game reconciliation failed");
            }
        }
        Ok(transition)
    }

    /// Closes the open mini-game. Returns the closed kind, or `None` when
    /// nothing was open.
    pub async fn close_mini_game(&self) -> Result<Option<MiniGameKind>, SessionError> {
        let mut state = self.state.lock().await;
        if state
            .minigame
            .as_ref()
            .is_some_and(MiniGameSession::is_awaiting)
        {
            return Err(SessionError::Busy(Surface::MiniGameRound));
        }
        let closed = state.minigame.take().map(|session| session.kind());
        drop(state);
        if let Some(kind) = closed {
            info!(%kind, "session: mini-game closed");
            self.publish(SessionEvent::MiniGameClosed(kind));
        }
        Ok(closed)
    }

    // ---- event modal ---------------------------------------------------

    /// Applies the player's choice on the shown event. Returns `None` for a
    /// local dismissal, otherwise the reconciled snapshot.
    pub async fn choose_event(
        &self,
        index: usize,
    ) -> Result<Option<Arc<GameSnapshot>>, SessionError> {
        let guard = self.claim(Surface::EventModal)?;
        let (title, resolution) = {
            let mut state = self.state.lock().await;
            let title = state.modal.current().map(|event| event.title.clone());
            let resolution = state.modal.begin_choice(index)?;
            (title.unwrap_or_default(), resolution)
        };
        match resolution {
            ModalResolution::Dismissed => {
                drop(guard);
                self.publish(SessionEvent::EventResolved {
                    title,
                    dispatched: false,
                });
                Ok(None)
            }
            ModalResolution::Dispatch(action) => {
                let snapshot = self.resolve_event(title, action).await?;
                drop(guard);
                Ok(Some(snapshot))
            }
        }
    }

    /// Acknowledges an informational event.
    pub async fn acknowledge_event(&self) -> Result<Arc<GameSnapshot>, SessionError> {
        let _guard = self.claim(Surface::EventModal)?;
        let (title, action) = {
            let mut state = self.state.lock().await;
            let title = state.modal.current().map(|event| event.title.clone());
            let action = state.modal.begin_acknowledge()?;
            (title.unwrap_or_default(), action)
        };
        self.resolve_event(title, action).await
    }

    async fn resolve_event(
        &self,
        title: String,
        action: ClientAction,
    ) -> Result<Arc<GameSnapshot>, SessionError> {
        let response = match self.dispatch(&action).await {
            Ok(response) => response,
            Err(err) => {
                self.state.lock().await.modal.abort();
                return Err(err);
            }
        };
        if let Err(err) = self.reject_if_error(&response) {
            self.state.lock().await.modal.abort();
            return Err(err);
        }

        info!(%title, action = action.name(), "session: event resolved");
        let mut state = self.state.lock().await;
        state.modal.complete(response.state.as_ref());
        let snapshot = match response.state {
            Some(snapshot) => Some(self.reconcile(&mut state, snapshot)),
            None => None,
        };
        drop(state);
        self.publish(SessionEvent::EventResolved {
            title,
            dispatched: true,
        });
        if let Some(message) = response.message {
            self.notify(NoticeLevel::Info, message);
        }
        match snapshot {
            Some(snapshot) => Ok(snapshot),
            None => self.refresh_state().await,
        }
    }

    // ---- plumbing ------------------------------------------------------

    fn claim(&self, surface: Surface) -> Result<SurfaceGuard<'_>, SessionError> {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !inflight.insert(surface) {
            return Err(SessionError::Busy(surface));
        }
        Ok(SurfaceGuard {
            inflight: &self.inflight,
            surface,
        })
    }

    async fn run_desk_action(&self, action: ClientAction) -> Result<ActionReceipt, SessionError> {
        if let Some(event) = self.current_event().await {
            return Err(SessionError::EventPending(event.title));
        }
        self.run_action(Surface::Desk, action).await
    }

    async fn run_action(
        &self,
        surface: Surface,
        action: ClientAction,
    ) -> Result<ActionReceipt, SessionError> {
        let _guard = self.claim(surface)?;
        let response = self.dispatch(&action).await?;
        self.reject_if_error(&response)?;

        let snapshot = match response.state {
            Some(snapshot) => {
                let mut state = self.state.lock().await;
                Some(self.reconcile(&mut state, snapshot))
            }
            None => None,
        };
        if let Some(message) = &response.message {
            self.notify(NoticeLevel::Info, message.clone());
        }
        Ok(ActionReceipt {
            message: response.message,
            snapshot,
        })
    }

    async fn dispatch(&self, action: &ClientAction) -> Result<ActionResponse, SessionError> {
        self.transport.send(action).await.map_err(|err| {
            warn!(action = action.name(), error = %err, "session: dispatch failed");
            self.notify(
                NoticeLevel::Error,
                format!("{} failed: {err}", action.name()),
            );
            SessionError::Dispatch(err)
        })
    }

    async fn refresh_state(&self) -> Result<Arc<GameSnapshot>, SessionError> {
        let snapshot = self.transport.fetch_state().await.map_err(|err| {
            warn!(error = %err, "session: state load failed");
            self.notify(NoticeLevel::Error, format!("state load failed: {err}"));
            SessionError::Dispatch(err)
        })?;
        let mut state = self.state.lock().await;
        Ok(self.reconcile(&mut state, snapshot))
    }

    /// Business errors surface their message and never touch the store.
    fn reject_if_error(&self, response: &ActionResponse) -> Result<(), SessionError> {
        match response.rejection() {
            Some(rejection) => {
                info!(message = %rejection.message, "session: server rejected action");
                self.notify(NoticeLevel::Warning, rejection.message.clone());
                Err(rejection.into())
            }
            None => Ok(()),
        }
    }

    fn reconcile(&self, state: &mut SessionState, snapshot: GameSnapshot) -> Arc<GameSnapshot> {
        let snapshot = state.store.replace(snapshot);
        self.publish(SessionEvent::SnapshotReplaced {
            version: state.store.version(),
            week: snapshot.week,
            year: snapshot.year,
        });
        if let Some(event) = state.modal.observe(&snapshot) {
            self.publish(SessionEvent::EventShown(event.clone()));
        }
        snapshot
    }

    async fn abort_submit<G: SessionVariant>(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.minigame.as_mut().and_then(G::slot_mut) {
            session.abort_submit();
        }
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(SessionEvent::Notice(Notice::new(level, message)));
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the accessors stay authoritative.
        let _ = self.events.send(event);
    }
}

fn save_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_SAVE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
