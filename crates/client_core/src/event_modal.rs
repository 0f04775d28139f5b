use shared::{
    domain::{GameEvent, GameSnapshot},
    protocol::{ChoiceEffect, ClientAction},
};
use tracing::{debug, info, warn};

use crate::error::{SessionError, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalPhase {
    Hidden,
    Shown,
    /// A choice or acknowledgement is on the wire.
    Resolving,
}

/// How a player's pick on the shown event is carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum ModalResolution {
    /// `continue`: closed locally, nothing is sent.
    Dismissed,
    Dispatch(ClientAction),
}

/// Materializes the head of the server's event queue as a blocking modal.
/// Only one event is ever visible; the server advances the queue.
#[derive(Debug, Default)]
pub struct EventModalController {
    shown: Option<GameEvent>,
    resolving: bool,
    /// Head event the player closed locally; kept hidden until the head changes.
    dismissed: Option<GameEvent>,
    /// Queue length last seen while `shown` was queued.
    queued: usize,
}

impl EventModalController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ModalPhase {
        match (&self.shown, self.resolving) {
            (None, _) => ModalPhase::Hidden,
            (Some(_), false) => ModalPhase::Shown,
            (Some(_), true) => ModalPhase::Resolving,
        }
    }

    pub fn current(&self) -> Option<&GameEvent> {
        self.shown.as_ref()
    }

    /// Re-evaluates the modal against a freshly reconciled snapshot. Returns
    /// the event if this call made it visible.
    pub fn observe(&mut self, snapshot: &GameSnapshot) -> Option<&GameEvent> {
        if self.resolving {
            return None;
        }

        if let Some(shown) = &self.shown {
            if snapshot.events_queue.contains(shown) {
                self.queued = snapshot.events_queue.len();
                return None;
            }
            debug!(title = %shown.title, "modal: shown event left the queue; hiding it");
            self.shown = None;
        }

        let Some(head) = snapshot.head_event() else {
            self.dismissed = None;
            return None;
        };
        if self.dismissed.as_ref() == Some(head) {
            return None;
        }
        self.dismissed = None;

        info!(title = %head.title, choices = head.choices.len(), "modal: showing event");
        self.shown = Some(head.clone());
        self.queued = snapshot.events_queue.len();
        self.shown.as_ref()
    }

    /// Resolves the player's pick on a choice event.
    pub fn begin_choice(&mut self, index: usize) -> Result<ModalResolution, SessionError> {
        if self.resolving {
            return Err(SessionError::Busy(Surface::EventModal));
        }
        let event = self.shown.as_ref().ok_or(SessionError::NoEvent)?;
        let choice = event
            .choices
            .get(index)
            .ok_or(SessionError::NoSuchChoice {
                index,
                available: event.choices.len(),
            })?;

        let action = match &choice.effect {
            ChoiceEffect::Continue => {
                info!(title = %event.title, "modal: dismissed locally");
                self.dismissed = self.shown.take();
                return Ok(ModalResolution::Dismissed);
            }
            ChoiceEffect::Restart => ClientAction::RestartGame,
            ChoiceEffect::ResetOffer(decision) => ClientAction::HandleResetOffer {
                decision: *decision,
            },
            ChoiceEffect::InfraRequest(request) => ClientAction::HandleInfraRequest {
                effect: request.clone(),
            },
        };
        self.resolving = true;
        Ok(ModalResolution::Dispatch(action))
    }

    /// Acknowledges an informational event; the server pops it on `clear_event`.
    pub fn begin_acknowledge(&mut self) -> Result<ClientAction, SessionError> {
        if self.resolving {
            return Err(SessionError::Busy(Surface::EventModal));
        }
        let event = self.shown.as_ref().ok_or(SessionError::NoEvent)?;
        if !event.is_informational() {
            return Err(SessionError::NoSuchChoice {
                index: 0,
                available: event.choices.len(),
            });
        }
        self.resolving = true;
        Ok(ClientAction::ClearEvent)
    }

    /// The dispatched resolution was accepted; the modal closes. Call
    /// [`observe`](Self::observe) with the reconciled snapshot afterwards.
    ///
    /// An identical head only counts as the resolved event if the queue did
    /// not shrink; otherwise it is a duplicate queued behind it.
    pub fn complete(&mut self, snapshot: Option<&GameSnapshot>) {
        let resolved = self.shown.take();
        self.resolving = false;
        if let (Some(resolved), Some(snapshot)) = (resolved, snapshot) {
            let popped = snapshot.events_queue.len() < self.queued;
            if !popped && snapshot.head_event() == Some(&resolved) {
                warn!(title = %resolved.title, "modal: server kept the resolved event at the head of the queue");
                self.dismissed = Some(resolved);
            }
        }
    }

    /// The resolution never took effect; the same event stays up.
    pub fn abort(&mut self) {
        self.resolving = false;
    }
}
