//! A single seat's view of a match.
//!
//! `LocalState` is both the snapshot the server sends when a match starts and
//! the state a client keeps up to date from match events. It only knows the
//! concealed tiles of its own seat.

use crate::{
    hand::{compare_calls, Call, Hand, RemoteHand},
    match_state::{next_turn_after_call, CallOutcome, MatchId},
    messages::FinalCall,
    tile::{TileId, TileInstance, Wind},
    ActionError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub id: MatchId,
    pub seat: Wind,
    pub players: [LocalHand; 4],
    pub turn_state: LocalTurnState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalHand {
    Local(Hand),
    Remote(RemoteHand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalTurnState {
    AwaitingDraw(Wind),
    AwaitingDiscard(Wind),

    /// `calls` are the calls the local seat may make on `discard`.
    AwaitingCalls {
        discarding_player: Wind,
        discard: TileInstance,
        calls: Vec<Call>,
        decision: CallDecision,
    },

    MatchEnded {
        winner: Option<Wind>,
    },
}

/// What the local seat has decided about the current discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDecision {
    /// The local seat discarded the tile or has nothing to call.
    NoCalls,
    Undecided,
    Pass,
    Call(Call),
}

impl From<CallOutcome> for LocalTurnState {
    fn from(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Won(seat) => LocalTurnState::MatchEnded { winner: Some(seat) },
            CallOutcome::Draw(seat) => LocalTurnState::AwaitingDraw(seat),
            CallOutcome::Discard(seat) => LocalTurnState::AwaitingDiscard(seat),
        }
    }
}

impl LocalState {
    pub fn local_hand(&self) -> Option<&Hand> {
        match &self.players[self.seat.index()] {
            LocalHand::Local(hand) => Some(hand),
            LocalHand::Remote(..) => None,
        }
    }

    /// Runs `op` against a copy of the state and only keeps the result if it
    /// succeeds.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut LocalState) -> Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        let mut next = self.clone();
        let value = op(&mut next)?;
        *self = next;
        Ok(value)
    }

    fn local_mut(&mut self) -> Result<&mut Hand, ActionError> {
        let seat = self.seat;
        match &mut self.players[seat.index()] {
            LocalHand::Local(hand) => Ok(hand),
            LocalHand::Remote(..) => Err(ActionError::NotRemote(seat)),
        }
    }

    fn remote_mut(&mut self, seat: Wind) -> Result<&mut RemoteHand, ActionError> {
        match &mut self.players[seat.index()] {
            LocalHand::Remote(hand) => Ok(hand),
            LocalHand::Local(..) => Err(ActionError::NotRemote(seat)),
        }
    }

    pub fn draw_local_tile(&mut self, tile: TileId) -> Result<(), ActionError> {
        self.transact(|state| {
            if state.turn_state != LocalTurnState::AwaitingDraw(state.seat) {
                return Err(ActionError::wrong_turn("local draw", &state.turn_state));
            }

            let instance = tile.instance().ok_or(ActionError::UnknownTile(tile))?;
            state.local_mut()?.draw_tile(instance)?;
            state.turn_state = LocalTurnState::AwaitingDiscard(state.seat);
            Ok(())
        })
    }

    pub fn draw_remote_tile(&mut self, seat: Wind) -> Result<(), ActionError> {
        self.transact(|state| {
            if state.turn_state != LocalTurnState::AwaitingDraw(seat) {
                return Err(ActionError::wrong_turn("remote draw", &state.turn_state));
            }

            state.remote_mut(seat)?.draw();
            state.turn_state = LocalTurnState::AwaitingDiscard(seat);
            Ok(())
        })
    }

    /// Discards `tile` for `seat` and opens the call window.
    ///
    /// When another seat discards, the local seat's possible calls are listed
    /// in the resulting turn state.
    pub fn discard_tile(&mut self, seat: Wind, tile: TileId) -> Result<(), ActionError> {
        self.transact(|state| {
            if state.turn_state != LocalTurnState::AwaitingDiscard(seat) {
                return Err(ActionError::wrong_turn("discard", &state.turn_state));
            }

            let discard = tile.instance().ok_or(ActionError::UnknownTile(tile))?;
            let calls = if seat == state.seat {
                state.local_mut()?.discard_tile(tile)?;
                Vec::new()
            } else {
                state.remote_mut(seat)?.discard(discard)?;
                let can_chii = seat.next() == state.seat;
                state.local_mut()?.find_possible_calls(discard, can_chii)
            };

            let decision = if calls.is_empty() {
                CallDecision::NoCalls
            } else {
                CallDecision::Undecided
            };
            state.turn_state = LocalTurnState::AwaitingCalls {
                discarding_player: seat,
                discard,
                calls,
                decision,
            };
            Ok(())
        })
    }

    /// Records the local seat's decision on the current discard; `None` passes.
    pub fn decide_call(&mut self, call: Option<Call>) -> Result<(), ActionError> {
        let seat = self.seat;
        let LocalTurnState::AwaitingCalls {
            calls, decision, ..
        } = &mut self.turn_state
        else {
            return Err(ActionError::wrong_turn("call decision", &self.turn_state));
        };

        if *decision != CallDecision::Undecided {
            return Err(ActionError::NotWaiting(seat));
        }

        *decision = match call {
            Some(call) if calls.contains(&call) => CallDecision::Call(call),
            Some(call) => return Err(ActionError::InvalidCall { seat, call }),
            None => CallDecision::Pass,
        };
        Ok(())
    }

    /// Closes the call window after every seat passed.
    pub fn resolve_pass(&mut self) -> Result<(), ActionError> {
        let LocalTurnState::AwaitingCalls {
            discarding_player,
            decision,
            ..
        } = &self.turn_state
        else {
            return Err(ActionError::wrong_turn("pass", &self.turn_state));
        };

        if let CallDecision::Call(call) = decision {
            return Err(ActionError::CallIgnored(*call));
        }

        let next = discarding_player.next();
        self.turn_state = LocalTurnState::AwaitingDraw(next);
        Ok(())
    }

    /// Applies the call that won the current discard.
    ///
    /// If the local seat decided on a call of its own, a remote caller must
    /// outrank it.
    pub fn resolve_call(&mut self, final_call: &FinalCall) -> Result<(), ActionError> {
        self.transact(|state| {
            let LocalTurnState::AwaitingCalls {
                discarding_player,
                discard,
                calls,
                decision,
            } = state.turn_state.clone()
            else {
                return Err(ActionError::wrong_turn("call", &state.turn_state));
            };

            if discarding_player != final_call.called_from || discard.id != final_call.discard {
                return Err(ActionError::DiscardMismatch);
            }

            let FinalCall {
                caller,
                winning_call,
                ..
            } = *final_call;
            let invalid = ActionError::InvalidCall {
                seat: caller,
                call: winning_call,
            };

            if caller == state.seat {
                match decision {
                    CallDecision::Call(call) if call == winning_call => {}
                    CallDecision::Undecided if calls.contains(&winning_call) => {}
                    _ => return Err(invalid),
                }
            } else if caller == discarding_player {
                return Err(invalid);
            } else if let CallDecision::Call(local) = decision {
                let ordering =
                    compare_calls(caller, winning_call, state.seat, local, discarding_player);
                if ordering != std::cmp::Ordering::Greater {
                    return Err(ActionError::NotOutranked {
                        caller,
                        call: winning_call,
                        local,
                    });
                }
            }

            match &mut state.players[discarding_player.index()] {
                LocalHand::Local(hand) => {
                    if hand.take_last_discard() != Some(discard) {
                        return Err(ActionError::DiscardMismatch);
                    }
                }
                LocalHand::Remote(hand) => {
                    if hand.discards.pop() != Some(discard) {
                        return Err(ActionError::DiscardMismatch);
                    }
                }
            }

            match &mut state.players[caller.index()] {
                LocalHand::Local(hand) => hand.call_tile(discard, winning_call)?,
                LocalHand::Remote(hand) => hand.call_tile(discard, winning_call)?,
            }

            state.turn_state = next_turn_after_call(caller, winning_call);
            Ok(())
        })
    }

    /// Ends the match, keeping the winner if a Ron already decided it.
    pub fn end_match(&mut self) {
        if !matches!(self.turn_state, LocalTurnState::MatchEnded { .. }) {
            self.turn_state = LocalTurnState::MatchEnded { winner: None };
        }
    }
}
