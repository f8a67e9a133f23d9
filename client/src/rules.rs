//! The rule engine seam used by match mirrors, and the turn phase derived
//! from it.

use shared::hand::Call;
use shared::local_state::{CallDecision, LocalState, LocalTurnState};
use shared::messages::FinalCall;
use shared::tile::{TileId, Wind};
use shared::ActionError;
use std::fmt;

/// The step of the turn that the local player can currently act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingDraw,
    AwaitingDiscard {
        seat: Wind,
    },

    /// A discard by `discarder` is open to calls. `seat` is the seat the
    /// `candidate_calls` belong to, always the local seat: other seats' options
    /// are hidden. `candidate_calls` is empty when the local seat has nothing to
    /// call, is the discarder or has already decided.
    AwaitingCalls {
        seat: Wind,
        discarder: Wind,
        candidate_calls: Vec<Call>,
    },
    MatchEnded,
}

impl TurnPhase {
    pub fn can_discard(&self, seat: Wind) -> bool {
        matches!(self, TurnPhase::AwaitingDiscard { seat: current } if *current == seat)
    }

    pub fn can_call(&self, seat: Wind) -> bool {
        matches!(
            self,
            TurnPhase::AwaitingCalls { seat: current, candidate_calls, .. }
                if *current == seat && !candidate_calls.is_empty()
        )
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::AwaitingDraw => write!(f, "awaiting draw"),
            TurnPhase::AwaitingDiscard { seat } => write!(f, "awaiting discard from {seat:?}"),
            TurnPhase::AwaitingCalls {
                seat,
                discarder,
                candidate_calls,
            } => write!(
                f,
                "awaiting calls on {discarder:?}'s discard ({seat:?} may make {candidate_calls:?})"
            ),
            TurnPhase::MatchEnded => write!(f, "match ended"),
        }
    }
}

/// Mahjong rules as seen from one seat.
///
/// Every command either applies fully or fails with the state untouched.
pub trait RuleEngine: Clone + fmt::Debug {
    fn from_snapshot(snapshot: LocalState) -> Self;

    fn local_seat(&self) -> Wind;

    fn draw_local(&mut self, tile: TileId) -> Result<(), ActionError>;

    fn draw_remote(&mut self, seat: Wind) -> Result<(), ActionError>;

    fn discard(&mut self, seat: Wind, tile: TileId) -> Result<(), ActionError>;

    fn decide_pass(&mut self) -> Result<(), ActionError>;

    fn decide_call(&mut self, call: Call) -> Result<(), ActionError>;

    /// Closes the call window after every seat passed.
    fn resolve_pass(&mut self) -> Result<(), ActionError>;

    fn resolve_call(&mut self, call: &FinalCall) -> Result<(), ActionError>;

    fn end_match(&mut self);

    fn current_turn_phase(&self) -> TurnPhase;

    fn winner(&self) -> Option<Wind>;
}

impl RuleEngine for LocalState {
    fn from_snapshot(snapshot: LocalState) -> Self {
        snapshot
    }

    fn local_seat(&self) -> Wind {
        self.seat
    }

    fn draw_local(&mut self, tile: TileId) -> Result<(), ActionError> {
        self.draw_local_tile(tile)
    }

    fn draw_remote(&mut self, seat: Wind) -> Result<(), ActionError> {
        self.draw_remote_tile(seat)
    }

    fn discard(&mut self, seat: Wind, tile: TileId) -> Result<(), ActionError> {
        self.discard_tile(seat, tile)
    }

    fn decide_pass(&mut self) -> Result<(), ActionError> {
        LocalState::decide_call(self, None)
    }

    fn decide_call(&mut self, call: Call) -> Result<(), ActionError> {
        LocalState::decide_call(self, Some(call))
    }

    fn resolve_pass(&mut self) -> Result<(), ActionError> {
        LocalState::resolve_pass(self)
    }

    fn resolve_call(&mut self, call: &FinalCall) -> Result<(), ActionError> {
        LocalState::resolve_call(self, call)
    }

    fn end_match(&mut self) {
        LocalState::end_match(self)
    }

    fn current_turn_phase(&self) -> TurnPhase {
        match &self.turn_state {
            LocalTurnState::AwaitingDraw(..) => TurnPhase::AwaitingDraw,
            LocalTurnState::AwaitingDiscard(seat) => TurnPhase::AwaitingDiscard { seat: *seat },
            LocalTurnState::AwaitingCalls {
                discarding_player,
                calls,
                decision,
                ..
            } => TurnPhase::AwaitingCalls {
                seat: self.seat,
                discarder: *discarding_player,
                candidate_calls: match decision {
                    CallDecision::Undecided => calls.clone(),
                    CallDecision::NoCalls | CallDecision::Pass | CallDecision::Call(..) => {
                        Vec::new()
                    }
                },
            },
            LocalTurnState::MatchEnded { .. } => TurnPhase::MatchEnded,
        }
    }

    fn winner(&self) -> Option<Wind> {
        match self.turn_state {
            LocalTurnState::MatchEnded { winner } => winner,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::match_state::{MatchId, MatchState};
    use shared::tile::generate_tileset;

    fn engine(seat: Wind) -> LocalState {
        let mut state = MatchState::new(MatchId::new(1), generate_tileset()).unwrap();
        state.draw_for_player(Wind::East).unwrap();
        LocalState::from_snapshot(state.local_state_for_player(seat))
    }

    #[test]
    fn test_phase_follows_turn_state() {
        let mut east = engine(Wind::East);
        assert_eq!(
            east.current_turn_phase(),
            TurnPhase::AwaitingDiscard { seat: Wind::East }
        );
        assert!(east.current_turn_phase().can_discard(Wind::East));
        assert!(!east.current_turn_phase().can_discard(Wind::South));

        east.discard(Wind::East, TileId::new(5)).unwrap();
        assert_eq!(
            east.current_turn_phase(),
            TurnPhase::AwaitingCalls {
                seat: Wind::East,
                discarder: Wind::East,
                candidate_calls: Vec::new(),
            }
        );

        east.resolve_pass().unwrap();
        assert_eq!(east.current_turn_phase(), TurnPhase::AwaitingDraw);
    }

    #[test]
    fn test_call_phase_names_the_discarder() {
        let mut south = engine(Wind::South);
        south.discard(Wind::East, TileId::new(12)).unwrap();

        match south.current_turn_phase() {
            TurnPhase::AwaitingCalls {
                seat,
                discarder,
                candidate_calls,
            } => {
                assert_eq!(seat, Wind::South);
                assert_eq!(discarder, Wind::East);
                assert!(candidate_calls.contains(&Call::Ron));
            }
            other => panic!("unexpected phase {other:?}"),
        }
        assert!(south
            .current_turn_phase()
            .to_string()
            .starts_with("awaiting calls on East's discard (South may make"));
    }

    #[test]
    fn test_candidates_clear_once_decided() {
        let mut south = engine(Wind::South);
        south.discard(Wind::East, TileId::new(12)).unwrap();
        assert!(south.current_turn_phase().can_call(Wind::South));

        south.decide_pass().unwrap();
        assert!(!south.current_turn_phase().can_call(Wind::South));
        assert!(south.decide_pass().is_err());
    }

    #[test]
    fn test_winner_only_after_match_end() {
        let mut east = engine(Wind::East);
        assert_eq!(east.winner(), None);
        RuleEngine::end_match(&mut east);
        assert_eq!(east.current_turn_phase(), TurnPhase::MatchEnded);
        assert_eq!(east.winner(), None);
    }
}
