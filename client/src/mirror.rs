use crate::rules::{RuleEngine, TurnPhase};
use log::{debug, trace};
use shared::local_state::LocalState;
use shared::messages::MatchEvent;
use shared::ActionError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorRole {
    /// Only ever sees confirmed events.
    Server,
    /// Sees confirmed events plus the local player's speculative actions.
    Local,
}

impl fmt::Display for MirrorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorRole::Server => write!(f, "server"),
            MirrorRole::Local => write!(f, "local"),
        }
    }
}

/// A copy of the match driven by its own rule engine instance.
#[derive(Debug, Clone)]
pub struct MatchMirror<E: RuleEngine = LocalState> {
    role: MirrorRole,
    engine: E,
}

impl<E: RuleEngine> MatchMirror<E> {
    /// Builds the server and local mirrors from the same initial snapshot.
    pub fn create_pair(snapshot: LocalState) -> (MatchMirror<E>, MatchMirror<E>) {
        let engine = E::from_snapshot(snapshot);
        let server = MatchMirror {
            role: MirrorRole::Server,
            engine: engine.clone(),
        };
        let local = MatchMirror {
            role: MirrorRole::Local,
            engine,
        };
        (server, local)
    }

    pub fn role(&self) -> MirrorRole {
        self.role
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct access for speculative actions.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn phase(&self) -> TurnPhase {
        self.engine.current_turn_phase()
    }

    /// Applies a confirmed event through the rule engine.
    pub fn apply(&mut self, event: &MatchEvent) -> Result<(), ActionError> {
        trace!("Applying {:?} to {} mirror", event, self.role);

        match event {
            MatchEvent::LocalDraw { tile } => self.engine.draw_local(*tile)?,
            MatchEvent::RemoteDraw { seat } => self.engine.draw_remote(*seat)?,
            MatchEvent::TileDiscarded { seat, tile } => self.engine.discard(*seat, *tile)?,
            MatchEvent::Pass => self.engine.resolve_pass()?,
            MatchEvent::Call(call) => self.engine.resolve_call(call)?,
            MatchEvent::MatchEnded => self.engine.end_match(),
        }

        debug!("{} mirror now in {}", self.role, self.phase());
        Ok(())
    }
}
