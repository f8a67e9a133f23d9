//! Turn synchronization between the local player and the match server.
//!
//! The synchronizer keeps two mirrors of the match. The server mirror only
//! ever sees events the server confirmed. The local mirror additionally applies
//! the local player's own actions the moment they are requested, so the game
//! responds without waiting for a round trip.
//!
//! Every confirmed event is checked against the action still waiting for
//! confirmation, if any. An event that contradicts it is a desync: nothing is
//! applied and the session ends, since neither mirror can be trusted to repair
//! the other.

use crate::channel::MessageChannel;
use crate::codec;
use crate::error::{DesyncError, IntentError, ProtocolError, SessionError};
use crate::mirror::MatchMirror;
use crate::rules::{RuleEngine, TurnPhase};
use log::{debug, error, info, warn};
use shared::hand::Call;
use shared::local_state::LocalState;
use shared::match_state::MatchId;
use shared::messages::{ClientRequest, MatchEvent};
use shared::tile::{TileId, Wind};
use shared::ActionError;
use std::fmt;
use tokio::sync::watch;

/// A local action applied to the local mirror but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Discard(TileId),
    Call(Call),
    Pass,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingAction::Discard(tile) => write!(f, "discard of tile {}", tile.raw()),
            PendingAction::Call(call) => write!(f, "call {call:?}"),
            PendingAction::Pass => write!(f, "pass"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Continue,
    MatchEnded { winner: Option<Wind> },
}

/// Read-only view of the current turn phase.
#[derive(Debug, Clone)]
pub struct PhaseWatcher {
    receiver: watch::Receiver<TurnPhase>,
}

impl PhaseWatcher {
    pub fn current(&self) -> TurnPhase {
        self.receiver.borrow().clone()
    }

    /// Waits for the next phase change. Returns `None` once the session is
    /// gone.
    pub async fn changed(&mut self) -> Option<TurnPhase> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

pub struct TurnSynchronizer<E: RuleEngine = LocalState> {
    match_id: MatchId,
    seat: Wind,
    server: MatchMirror<E>,
    local: MatchMirror<E>,
    pending: Option<PendingAction>,
    channel: MessageChannel,
    phase: watch::Sender<TurnPhase>,
    finished: bool,
}

impl<E: RuleEngine> TurnSynchronizer<E> {
    pub fn new(snapshot: LocalState, channel: MessageChannel) -> Self {
        let match_id = snapshot.id;
        let seat = snapshot.seat;
        let (server, local) = MatchMirror::<E>::create_pair(snapshot);
        let (phase, _) = watch::channel(local.phase());

        info!("Joined match {} as {:?}, {}", match_id.raw(), seat, local.phase());

        Self {
            match_id,
            seat,
            server,
            local,
            pending: None,
            channel,
            phase,
            finished: false,
        }
    }

    pub fn seat(&self) -> Wind {
        self.seat
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// The phase the local player can act on, derived from the local mirror.
    pub fn phase(&self) -> TurnPhase {
        self.local.phase()
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn server_mirror(&self) -> &MatchMirror<E> {
        &self.server
    }

    pub fn local_mirror(&self) -> &MatchMirror<E> {
        &self.local
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn watch_phase(&self) -> PhaseWatcher {
        PhaseWatcher {
            receiver: self.phase.subscribe(),
        }
    }

    pub fn request_discard(&mut self, tile: TileId) -> Result<(), IntentError> {
        self.check_ready()?;

        let phase = self.phase();
        if !phase.can_discard(self.seat) {
            return Err(IntentError::WrongPhase {
                phase: phase.to_string(),
            });
        }

        let request = ClientRequest::DiscardTile {
            id: self.match_id,
            player: self.seat,
            tile,
        };
        let seat = self.seat;
        self.speculate(PendingAction::Discard(tile), &request, |engine| {
            engine.discard(seat, tile)
        })
    }

    pub fn request_call(&mut self, call: Call) -> Result<(), IntentError> {
        self.check_ready()?;
        self.check_call_window()?;

        let request = ClientRequest::Call {
            id: self.match_id,
            player: self.seat,
            call,
        };
        self.speculate(PendingAction::Call(call), &request, |engine| {
            engine.decide_call(call)
        })
    }

    pub fn request_pass(&mut self) -> Result<(), IntentError> {
        self.check_ready()?;
        self.check_call_window()?;

        let request = ClientRequest::Pass {
            id: self.match_id,
            player: self.seat,
        };
        self.speculate(PendingAction::Pass, &request, |engine| engine.decide_pass())
    }

    fn check_ready(&self) -> Result<(), IntentError> {
        if self.finished {
            return Err(IntentError::SessionOver);
        }

        if let Some(pending) = self.pending {
            error!("Intent issued while {} is still pending", pending);
            return Err(IntentError::ActionPending);
        }

        Ok(())
    }

    fn check_call_window(&self) -> Result<(), IntentError> {
        let phase = self.phase();
        if phase.can_call(self.seat) {
            Ok(())
        } else {
            Err(IntentError::WrongPhase {
                phase: phase.to_string(),
            })
        }
    }

    /// Applies `action` to the local mirror, records it as pending and sends
    /// `request`. Nothing changes if any step fails.
    fn speculate(
        &mut self,
        action: PendingAction,
        request: &ClientRequest,
        apply: impl FnOnce(&mut E) -> Result<(), ActionError>,
    ) -> Result<(), IntentError> {
        let text = codec::encode_request(request)?;

        let previous = self.local.clone();
        apply(self.local.engine_mut()).map_err(|e| {
            debug!("Rejected {}: {}", action, e);
            IntentError::Rejected(e)
        })?;

        if let Err(e) = self.channel.send(text) {
            warn!("Failed to send {}: {}", action, e);
            self.local = previous;
            self.finished = true;
            return Err(e.into());
        }

        debug!("Speculatively applied {}", action);
        self.pending = Some(action);
        self.publish_phase();
        Ok(())
    }

    /// Decodes and handles one inbound message.
    pub fn handle_message(&mut self, text: &str) -> Result<Progress, SessionError> {
        let event = match codec::decode_event(text) {
            Ok(event) => event,
            Err(e) => return Err(self.terminate(e.into())),
        };
        self.handle_event(event)
    }

    /// Applies a confirmed event to both mirrors.
    ///
    /// Either both mirrors take the event or neither does.
    pub fn handle_event(&mut self, event: MatchEvent) -> Result<Progress, SessionError> {
        debug!("Received {:?}", event);

        let mut server = self.server.clone();
        if let Err(reason) = server.apply(&event) {
            let error = ProtocolError::InvalidEvent {
                event: event.clone(),
                reason,
            };
            return Err(self.terminate(error.into()));
        }

        let mut local = self.local.clone();
        let pending = match self.reconcile(&mut local, &event) {
            Ok(pending) => pending,
            Err(e) => return Err(self.terminate(e.into())),
        };

        self.server = server;
        self.local = local;
        self.pending = pending;
        self.publish_phase();

        if event == MatchEvent::MatchEnded {
            self.finished = true;
            let winner = self.local.engine().winner();
            info!("Match {} ended, winner: {:?}", self.match_id.raw(), winner);
            return Ok(Progress::MatchEnded { winner });
        }

        Ok(Progress::Continue)
    }

    /// Folds `event` into `local` and returns what is still pending afterwards.
    fn reconcile(
        &self,
        local: &mut MatchMirror<E>,
        event: &MatchEvent,
    ) -> Result<Option<PendingAction>, DesyncError> {
        let mismatch = |pending: PendingAction| DesyncError::Mismatch {
            pending: pending.to_string(),
            event: event.clone(),
        };
        let unrequested = || DesyncError::Unrequested {
            event: event.clone(),
        };
        let apply = |local: &mut MatchMirror<E>| {
            local.apply(event).map_err(|reason| DesyncError::Diverged {
                event: event.clone(),
                reason,
            })
        };

        match event {
            // Already applied when it was requested.
            MatchEvent::TileDiscarded { seat, tile } if *seat == self.seat => {
                match self.pending {
                    Some(PendingAction::Discard(expected)) if expected == *tile => Ok(None),
                    Some(pending) => Err(mismatch(pending)),
                    None => Err(unrequested()),
                }
            }

            // The decision was speculative, but resolving the window was not.
            MatchEvent::Call(call) if call.caller == self.seat => match self.pending {
                Some(PendingAction::Call(expected)) if expected == call.winning_call => {
                    apply(local)?;
                    Ok(None)
                }
                Some(pending) => Err(mismatch(pending)),
                None => Err(unrequested()),
            },

            MatchEvent::Pass | MatchEvent::Call(..) => match self.pending {
                Some(PendingAction::Pass) | Some(PendingAction::Call(..)) => {
                    apply(local)?;
                    Ok(None)
                }
                Some(pending) => Err(mismatch(pending)),
                None if local.phase().can_call(self.seat) => Err(DesyncError::UndecidedCall {
                    event: event.clone(),
                }),
                None => {
                    apply(local)?;
                    Ok(None)
                }
            },

            MatchEvent::MatchEnded => {
                if let Some(pending) = self.pending {
                    warn!("Match ended with {} unconfirmed", pending);
                }
                apply(local)?;
                Ok(None)
            }

            MatchEvent::LocalDraw { .. }
            | MatchEvent::RemoteDraw { .. }
            | MatchEvent::TileDiscarded { .. } => {
                apply(local)?;
                Ok(self.pending)
            }
        }
    }

    fn terminate(&mut self, error: SessionError) -> SessionError {
        error!("Session out of sync: {}", error);
        self.finished = true;
        error
    }

    fn publish_phase(&self) {
        self.phase.send_replace(self.local.phase());
    }
}
